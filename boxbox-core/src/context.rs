//! Event context payload builder

use crate::event::EventContext;
use crate::model::{
    compound_name, ers_mode_name, fuel_mix_name, safety_car_name, track_name, weather_name,
    CarSnapshot, CompetitorState, DamageComponent,
};
use crate::store::find_by_position;
use crate::track::track_context;
use serde_json::{json, Value};

/// Per-tick change in gap-ahead below which the trend reads as "holding"
const TREND_BAND_S: f32 = 0.05;

/// Round to two decimals so floats read cleanly in prompts
pub fn round2(value: f32) -> f64 {
    (f64::from(value) * 100.0).round() / 100.0
}

pub fn gap_trend_description(trend: f32) -> &'static str {
    if trend > TREND_BAND_S {
        "closing"
    } else if trend < -TREND_BAND_S {
        "pulling away"
    } else {
        "holding"
    }
}

/// Facts shared by every event for this competitor
pub fn base_context(
    state: &CompetitorState,
    field: &[CarSnapshot],
    gap_trend: f32,
    projected_wear: f32,
) -> EventContext {
    let track = track_name(state.track_id);
    let mut ctx = EventContext::new();

    let mut put = |key: &str, value: Value| {
        ctx.insert(key.to_string(), value);
    };

    put("driver", json!(state.driver_name));
    put("track", json!(track));
    put("session", json!(state.session_kind.display_name()));
    put("lap", json!(state.current_lap));
    put("total_laps", json!(state.total_laps));
    put("position", json!(state.position));
    put("total_cars", json!(state.total_participants));
    put("tyre_compound", json!(compound_name(state.visual_compound)));
    put("tyre_age_laps", json!(state.tyre_age_laps));
    put(
        "tyre_wear",
        json!({
            "front_left": round2(state.tyre_wear.front_left),
            "front_right": round2(state.tyre_wear.front_right),
            "rear_left": round2(state.tyre_wear.rear_left),
            "rear_right": round2(state.tyre_wear.rear_right),
        }),
    );
    put("max_wear", json!(round2(state.max_tyre_wear())));
    put("projected_wear", json!(round2(projected_wear)));
    put("fuel_kg", json!(round2(state.fuel_mass_kg)));
    put("fuel_remaining_laps", json!(round2(state.fuel_remaining_laps)));
    put("fuel_mix", json!(fuel_mix_name(state.fuel_mix)));
    put("ers_percent", json!(round2(state.ers_percent())));
    put("ers_mode", json!(ers_mode_name(state.ers_deploy_mode)));
    put("gap_ahead", json!(round2(state.gap_ahead_s)));
    put("gap_behind", json!(round2(state.gap_behind_s)));
    put("gap_trend", json!(gap_trend_description(gap_trend)));
    put("weather", json!(weather_name(state.weather)));
    put("drs_available", json!(state.drs_allowed));
    put("safety_car", json!(safety_car_name(state.safety_car_status)));
    put("penalty_seconds", json!(state.penalty_seconds));
    put("yellow_sector", json!(state.yellow_sector.unwrap_or(0)));

    let damage: serde_json::Map<String, Value> = DamageComponent::ALL
        .iter()
        .map(|c| (c.name().to_string(), json!(round2(state.damage.get(*c)))))
        .collect();
    put("damage", Value::Object(damage));

    put(
        "leaderboard_nearby",
        Value::Array(leaderboard_nearby(state.position, field)),
    );

    if let Some(track_ctx) = state
        .lap_fraction()
        .and_then(|frac| track_context(track, frac))
    {
        if let Ok(value) = serde_json::to_value(track_ctx) {
            put("track_context", value);
        }
    }

    ctx
}

/// Cars from P-2 to P+3 around `position`
pub fn leaderboard_nearby(position: u8, field: &[CarSnapshot]) -> Vec<Value> {
    if position == 0 {
        return Vec::new();
    }
    let from = position.saturating_sub(2).max(1);
    let to = position.saturating_add(3);
    (from..=to)
        .filter_map(|pos| find_by_position(field, pos))
        .map(|car| {
            json!({
                "position": car.position,
                "lap": car.current_lap,
                "gap_to_leader": round2(car.gap_to_leader_s),
                "in_pit": car.in_pit(),
                "max_damage": round2(car.max_damage),
                "is_you": car.position == position,
            })
        })
        .collect()
}
