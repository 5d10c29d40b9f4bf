//! Integration tests for the trigger evaluation engine

use boxbox_core::model::{CarSnapshot, CompetitorState, NUM_CARS};
use boxbox_core::{AdvisoryEvent, EngineConfig, SessionKind, TriggerEngine, TriggerKind};
use serde_json::json;
use std::time::{Duration, Instant};

/// Past the 25s startup grace period
const AFTER_GRACE: Duration = Duration::from_secs(30);

fn engine() -> (TriggerEngine, Instant) {
    let t0 = Instant::now();
    (TriggerEngine::with_start(EngineConfig::default(), t0), t0)
}

fn empty_field() -> [CarSnapshot; NUM_CARS] {
    std::array::from_fn(|idx| CarSnapshot {
        car_index: idx as u8,
        ..Default::default()
    })
}

/// Player in P5 on lap 2 of a 5 lap race with nothing wrong
fn race_state() -> CompetitorState {
    let mut state = CompetitorState::new(0);
    state.session_type_raw = 15;
    state.session_kind = SessionKind::Race;
    state.total_laps = 5;
    state.current_lap = 2;
    state.position = 5;
    state.total_participants = 20;
    state.fuel_mass_kg = 20.0;
    state.fuel_remaining_laps = 10.0;
    state.fia_flag = 1;
    state
}

fn kinds(events: &[AdvisoryEvent]) -> Vec<TriggerKind> {
    events.iter().map(|e| e.kind()).collect()
}

// ==================== Gating ====================

#[test]
fn test_unset_session_is_skipped() {
    let (mut engine, t0) = engine();
    let mut state = race_state();
    state.session_kind = SessionKind::Unset;
    state.fuel_remaining_laps = 0.2;

    assert!(engine.evaluate(&state, &empty_field(), t0 + AFTER_GRACE).is_empty());
}

#[test]
fn test_post_session_silence() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    state.session_finished = true;

    let first = engine.evaluate(&state, &field, t0 + AFTER_GRACE);
    assert!(kinds(&first).contains(&TriggerKind::RaceFinished));

    // Anything else going wrong afterwards stays silent
    state.fuel_remaining_laps = 0.1;
    state.damage.floor = 80.0;
    state.safety_car_status = 1;
    for tick in 1..20u64 {
        let now = t0 + AFTER_GRACE + Duration::from_secs(tick * 300);
        assert!(engine.evaluate(&state, &field, now).is_empty());
    }
}

#[test]
fn test_batch_is_capped_and_sorted() {
    let (mut engine, t0) = engine();
    let mut state = race_state();
    state.fuel_remaining_laps = 0.3;
    state.tyre_wear.front_left = 90.0;
    state.damage.front_wing = 50.0;
    state.weather = 4;

    let events = engine.evaluate(&state, &empty_field(), t0 + AFTER_GRACE);

    assert_eq!(
        kinds(&events),
        vec![TriggerKind::CriticalFuel, TriggerKind::CriticalTyres]
    );
    assert!(events.windows(2).all(|w| w[0].priority() <= w[1].priority()));
}

#[test]
fn test_fuel_low_never_fires_in_qualifying() {
    let (mut race_engine, t0) = engine();
    let (mut quali_engine, _) = engine();
    let field = empty_field();

    let mut race = race_state();
    race.fuel_remaining_laps = 1.8;
    let mut quali = race.clone();
    quali.session_type_raw = 7;
    quali.session_kind = SessionKind::Qualifying;

    let now = t0 + AFTER_GRACE;
    assert!(kinds(&race_engine.evaluate(&race, &field, now)).contains(&TriggerKind::FuelLow));

    for tick in 0..10u64 {
        let later = now + Duration::from_secs(tick * 300);
        let events = quali_engine.evaluate(&quali, &field, later);
        assert!(!kinds(&events).contains(&TriggerKind::FuelLow));
    }
}

#[test]
fn test_grace_period_allows_only_safety_subset() {
    let (mut engine, t0) = engine();
    let mut state = race_state();
    state.current_lap = 1;
    state.fuel_remaining_laps = 1.8;

    let events = engine.evaluate(&state, &empty_field(), t0 + Duration::from_secs(5));
    assert_eq!(kinds(&events), vec![TriggerKind::SessionStart]);

    // The stale low-fuel reading seen during grace is not replayed later
    let later = engine.evaluate(&state, &empty_field(), t0 + AFTER_GRACE);
    assert!(!kinds(&later).contains(&TriggerKind::FuelLow));
}

#[test]
fn test_unknown_session_falls_back_to_practice() {
    let (mut engine, t0) = engine();
    let mut state = race_state();
    state.session_type_raw = 99;
    state.session_kind = SessionKind::Unknown;
    state.fuel_remaining_laps = 1.8;
    state.damage.rear_wing = 30.0;

    let events = engine.evaluate(&state, &empty_field(), t0 + AFTER_GRACE);
    assert_eq!(kinds(&events), vec![TriggerKind::Damage]);
}

// ==================== Tyres ====================

#[test]
fn test_tyre_warning_is_intent_aware() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    state.current_lap = 3;
    state.tyre_wear.front_left = 18.0;

    // 18 + 9 * 3 = 45 projected: nothing to say
    let now = t0 + AFTER_GRACE;
    let events = engine.evaluate(&state, &field, now);
    assert!(!kinds(&events).contains(&TriggerKind::TyreWarning));
    assert!(!kinds(&events).contains(&TriggerKind::CriticalTyres));

    // 32 + 16 * 3 = 80 projected
    state.tyre_wear.front_left = 32.0;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert!(kinds(&events).contains(&TriggerKind::TyreWarning));

    // Same wear, inside and then past the cooldown: no repeat
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(6));
    assert!(!kinds(&events).contains(&TriggerKind::TyreWarning));
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(200));
    assert!(!kinds(&events).contains(&TriggerKind::TyreWarning));

    // Five more points of wear re-arms it
    state.tyre_wear.front_left = 37.0;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(203));
    assert!(kinds(&events).contains(&TriggerKind::TyreWarning));
}

#[test]
fn test_critical_tyres_at_length_scaled_threshold() {
    let (mut engine, t0) = engine();
    let mut state = race_state();
    state.total_laps = 50;
    state.current_lap = 2;
    state.tyre_wear.rear_right = 75.0;

    let events = engine.evaluate(&state, &empty_field(), t0 + AFTER_GRACE);
    assert_eq!(events[0].kind(), TriggerKind::CriticalTyres);
    assert_eq!(events[0].context()["critical_threshold"], json!(75.0));
}

#[test]
fn test_tyre_warning_while_critical_cools_down() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    state.total_laps = 50;
    state.current_lap = 3;
    state.tyre_wear.rear_right = 75.0;
    let now = t0 + AFTER_GRACE;

    assert_eq!(
        kinds(&engine.evaluate(&state, &field, now)),
        vec![TriggerKind::CriticalTyres]
    );

    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert_eq!(kinds(&events), vec![TriggerKind::TyreWarning]);
}

#[test]
fn test_tyre_temperature_imbalance() {
    let (mut engine, t0) = engine();
    let mut state = race_state();
    state.tyre_inner_temp_c.front_left = 130.0;
    state.tyre_inner_temp_c.front_right = 95.0;
    state.tyre_inner_temp_c.rear_left = 95.0;
    state.tyre_inner_temp_c.rear_right = 95.0;

    let events = engine.evaluate(&state, &empty_field(), t0 + AFTER_GRACE);
    let event = events
        .iter()
        .find(|e| e.kind() == TriggerKind::TyreTempImbalance)
        .expect("imbalance should fire");
    assert_eq!(event.context()["hot_corner"], json!("front left"));
}

// ==================== Fuel ====================

#[test]
fn test_end_to_end_fuel_low_on_lap_two() {
    let (mut engine, t0) = engine();
    let mut state = race_state();
    state.tyre_wear.front_left = 18.0;
    state.fuel_remaining_laps = 1.8;

    let events = engine.evaluate(&state, &empty_field(), t0 + AFTER_GRACE);

    assert_eq!(kinds(&events), vec![TriggerKind::FuelLow]);
    assert_eq!(events[0].context()["fuel_remaining_laps"], json!(1.8));
    assert_eq!(events[0].priority(), 14);
}

#[test]
fn test_fuel_low_needs_a_real_drop_to_repeat() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    state.fuel_remaining_laps = 1.8;
    let now = t0 + AFTER_GRACE;

    assert!(kinds(&engine.evaluate(&state, &field, now)).contains(&TriggerKind::FuelLow));

    state.fuel_remaining_laps = 1.7;
    let later = now + Duration::from_secs(300);
    assert!(!kinds(&engine.evaluate(&state, &field, later)).contains(&TriggerKind::FuelLow));

    state.fuel_remaining_laps = 1.4;
    let later = later + Duration::from_secs(3);
    assert!(kinds(&engine.evaluate(&state, &field, later)).contains(&TriggerKind::FuelLow));
}

#[test]
fn test_fuel_low_while_critical_cools_down() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    state.fuel_remaining_laps = 0.45;
    let now = t0 + AFTER_GRACE;

    assert_eq!(
        kinds(&engine.evaluate(&state, &field, now)),
        vec![TriggerKind::CriticalFuel]
    );

    state.fuel_remaining_laps = 0.1;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert_eq!(kinds(&events), vec![TriggerKind::FuelLow]);
}

// ==================== Damage ====================

#[test]
fn test_damage_fires_once_per_component() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let mut now = t0 + AFTER_GRACE;

    state.damage.front_wing = 25.0;
    let events = engine.evaluate(&state, &field, now);
    assert_eq!(kinds(&events), vec![TriggerKind::Damage]);
    assert_eq!(events[0].context()["component"], json!("front wing"));

    for level in [60.0, 90.0, 0.0, 45.0] {
        now += Duration::from_secs(600);
        state.damage.front_wing = level;
        assert!(!kinds(&engine.evaluate(&state, &field, now)).contains(&TriggerKind::Damage));
    }

    // A different component still fires
    state.damage.floor = 22.0;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert_eq!(events[0].context()["component"], json!("floor"));
}

#[test]
fn test_nearby_car_damage_resets_after_repair() {
    let (mut engine, t0) = engine();
    let mut field = empty_field();
    let mut state = race_state();
    state.gap_ahead_s = 2.0;
    field[3].position = 4;
    field[3].max_damage = 45.0;

    let mut now = t0 + AFTER_GRACE;
    let fired = |events: &[AdvisoryEvent]| kinds(events).contains(&TriggerKind::NearbyCarDamage);

    assert!(fired(&engine.evaluate(&state, &field, now)));

    now += Duration::from_secs(600);
    assert!(!fired(&engine.evaluate(&state, &field, now)));

    field[3].max_damage = 10.0;
    now += Duration::from_secs(3);
    assert!(!fired(&engine.evaluate(&state, &field, now)));

    field[3].max_damage = 50.0;
    now += Duration::from_secs(3);
    assert!(fired(&engine.evaluate(&state, &field, now)));
}

// ==================== Race control ====================

#[test]
fn test_safety_car_transitions() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let mut now = t0 + AFTER_GRACE;

    let mut step = |sc: u8| {
        state.safety_car_status = sc;
        now += Duration::from_secs(3);
        kinds(&engine.evaluate(&state, &field, now))
    };

    assert!(step(0).is_empty());
    assert_eq!(step(1), vec![TriggerKind::SafetyCarDeployed]);
    assert!(step(1).is_empty());
    assert_eq!(step(0), vec![TriggerKind::SafetyCarEnding]);
    assert_eq!(step(2), vec![TriggerKind::VscDeployed]);
    assert_eq!(step(0), vec![TriggerKind::VscEnding]);
}

#[test]
fn test_yellow_flag_names_sector() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let now = t0 + AFTER_GRACE;

    assert!(engine.evaluate(&state, &field, now).is_empty());

    state.fia_flag = 3;
    state.yellow_sector = Some(2);
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert_eq!(kinds(&events), vec![TriggerKind::YellowFlag]);
    assert_eq!(events[0].context()["yellow_sector_text"], json!("sector two"));
}

#[test]
fn test_red_flag_fires_on_each_transition() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let mut now = t0 + AFTER_GRACE;
    engine.evaluate(&state, &field, now);

    for _ in 0..2 {
        state.fia_flag = 4;
        now += Duration::from_secs(3);
        assert_eq!(
            kinds(&engine.evaluate(&state, &field, now)),
            vec![TriggerKind::RedFlag]
        );
        state.fia_flag = 1;
        now += Duration::from_secs(3);
        engine.evaluate(&state, &field, now);
    }
}

#[test]
fn test_penalty_cold_start_suppression() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let now = t0 + AFTER_GRACE;

    state.penalty_seconds = 3;
    assert!(engine.evaluate(&state, &field, now).is_empty());

    state.penalty_seconds = 8;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert_eq!(kinds(&events), vec![TriggerKind::Penalty]);
    assert_eq!(events[0].context()["penalty_added"], json!(5));
}

#[test]
fn test_large_penalty_fires_on_first_read() {
    let (mut engine, t0) = engine();
    let mut state = race_state();
    state.penalty_seconds = 5;
    let events = engine.evaluate(&state, &empty_field(), t0 + AFTER_GRACE);
    assert_eq!(kinds(&events), vec![TriggerKind::Penalty]);
}

// ==================== Racing ====================

#[test]
fn test_defend_requires_shrinking_gap() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let mut now = t0 + AFTER_GRACE;
    let mut defend = |gap: f32, after: u64| {
        state.gap_behind_s = gap;
        now += Duration::from_secs(after);
        kinds(&engine.evaluate(&state, &field, now)).contains(&TriggerKind::Defend)
    };

    assert!(defend(0.8, 0));
    // Holding station behind us, cooldown long gone
    assert!(!defend(0.79, 120));
    // They drop back out of range, then come again
    assert!(!defend(1.6, 3));
    assert!(defend(0.9, 3));
}

#[test]
fn test_position_gained_and_lost() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let now = t0 + AFTER_GRACE;

    assert!(engine.evaluate(&state, &field, now).is_empty());

    state.position = 4;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert_eq!(kinds(&events), vec![TriggerKind::PositionGained]);
    assert_eq!(events[0].context()["previous_position"], json!(5));

    state.position = 6;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(40));
    assert_eq!(kinds(&events), vec![TriggerKind::PositionLost]);
}

#[test]
fn test_gap_close_ahead_and_trend() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    state.gap_ahead_s = 4.0;
    let now = t0 + AFTER_GRACE;

    engine.evaluate(&state, &field, now);

    state.gap_ahead_s = 3.5;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert_eq!(kinds(&events), vec![TriggerKind::GapCloseAhead]);
    assert_eq!(events[0].context()["gap_trend"], json!("closing"));

    let trend = engine.state(0).map(|ts| ts.gap_trend()).unwrap_or_default();
    assert!((trend - 0.125).abs() < 1e-4);
}

#[test]
fn test_gap_trend_decays_while_leading() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let mut now = t0 + AFTER_GRACE;

    for gap in [4.0, 3.0, 2.0] {
        state.gap_ahead_s = gap;
        now += Duration::from_secs(3);
        engine.evaluate(&state, &field, now);
    }
    let closing = engine.state(0).map(|ts| ts.gap_trend()).unwrap_or_default();
    assert!(closing > 0.4);

    // Took the lead: nothing ahead, so the trend fades
    state.position = 1;
    state.gap_ahead_s = 0.0;
    for _ in 0..10 {
        now += Duration::from_secs(3);
        engine.evaluate(&state, &field, now);
    }
    let leading = engine.state(0).map(|ts| ts.gap_trend()).unwrap_or_default();
    assert!(leading < closing * 0.1);
}

#[test]
fn test_gradual_gap_closing() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let mut now = t0 + AFTER_GRACE;
    let mut fired = Vec::new();

    for gap in [4.0, 3.85, 3.7, 3.55] {
        state.gap_ahead_s = gap;
        now += Duration::from_secs(3);
        fired.extend(kinds(&engine.evaluate(&state, &field, now)));
    }

    assert_eq!(fired, vec![TriggerKind::GapClosing]);
}

#[test]
fn test_rival_pitted_keyed_by_position() {
    let (mut engine, t0) = engine();
    let mut field = empty_field();
    let mut state = race_state();
    state.gap_ahead_s = 1.5;
    field[7].position = 4;
    field[7].pit_status = 1;
    let mut now = t0 + AFTER_GRACE;
    let fired = |events: &[AdvisoryEvent]| kinds(events).contains(&TriggerKind::RivalPitted);

    assert!(fired(&engine.evaluate(&state, &field, now)));
    now += Duration::from_secs(300);
    assert!(!fired(&engine.evaluate(&state, &field, now)));

    field[7].pit_status = 0;
    now += Duration::from_secs(3);
    engine.evaluate(&state, &field, now);

    field[7].pit_status = 2;
    now += Duration::from_secs(3);
    assert!(fired(&engine.evaluate(&state, &field, now)));
}

#[test]
fn test_personal_best_seeds_then_fires() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    let now = t0 + AFTER_GRACE;

    state.best_lap_time_ms = 90_500;
    assert!(engine.evaluate(&state, &field, now).is_empty());

    state.best_lap_time_ms = 89_900;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert_eq!(kinds(&events), vec![TriggerKind::PersonalBest]);
    assert_eq!(events[0].context()["improvement_ms"], json!(600));
}

#[test]
fn test_speed_trap_in_qualifying() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    state.session_type_raw = 7;
    state.session_kind = SessionKind::Qualifying;
    let now = t0 + AFTER_GRACE;

    // Below the speed floor
    state.max_speed_this_lap_kph = 190;
    let events = engine.evaluate(&state, &field, now);
    assert!(!kinds(&events).contains(&TriggerKind::SpeedTrap));

    state.current_lap = 3;
    state.max_speed_this_lap_kph = 312;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(3));
    assert!(kinds(&events).contains(&TriggerKind::SpeedTrap));

    state.max_speed_this_lap_kph = 313;
    let events = engine.evaluate(&state, &field, now + Duration::from_secs(200));
    assert!(!kinds(&events).contains(&TriggerKind::SpeedTrap));
}

#[test]
fn test_final_lap_is_one_shot() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    state.current_lap = 5;
    let now = t0 + AFTER_GRACE;

    assert_eq!(
        kinds(&engine.evaluate(&state, &field, now)),
        vec![TriggerKind::FinalLap]
    );
    assert!(engine
        .evaluate(&state, &field, now + Duration::from_secs(3))
        .is_empty());
}

// ==================== Companion operations ====================

#[test]
fn test_chequered_flag_once_per_competitor() {
    let (mut engine, _) = engine();
    let field = empty_field();
    let state = race_state();
    let mut other = race_state();
    other.car_index = 1;

    let event = engine.on_chequered_flag(&state, &field).expect("first call fires");
    assert_eq!(event.kind(), TriggerKind::ChequeredFlag);
    assert!(engine.on_chequered_flag(&state, &field).is_none());
    assert!(engine.on_chequered_flag(&other, &field).is_some());
}

#[test]
fn test_reset_session_rearms_one_shots() {
    let (mut engine, t0) = engine();
    let field = empty_field();
    let mut state = race_state();
    state.current_lap = 1;
    let now = t0 + AFTER_GRACE;

    assert_eq!(
        kinds(&engine.evaluate(&state, &field, now)),
        vec![TriggerKind::SessionStart]
    );
    assert!(engine.evaluate(&state, &field, now).is_empty());

    engine.reset_session(0);
    assert_eq!(
        kinds(&engine.evaluate(&state, &field, now)),
        vec![TriggerKind::SessionStart]
    );
}
