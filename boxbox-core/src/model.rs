//! Competitor and field data model
//!
//! `CompetitorState` holds everything the trigger engine reasons about for a
//! tracked car (the local player, and optionally a second split-screen
//! player). `CarSnapshot` is the slim per-slot view kept for every car in the
//! field, used for leaderboard context and "car ahead" lookups.
//!
//! Gaps and positions are only meaningful once `position > 0`.

use crate::session::SessionKind;
use serde::{Deserialize, Serialize};

/// Number of car slots in every per-car packet.
pub const NUM_CARS: usize = 22;

/// Weather code at or above which the track is considered wet (light rain).
pub const WET_WEATHER_CODE: u8 = 3;

/// Forecast samples at or below this offset (minutes) count as "incoming".
pub const FORECAST_LOOKAHEAD_MINUTES: u8 = 15;

/// Capacity of the ERS store in joules.
pub const ERS_STORE_CAPACITY_J: f32 = 4_000_000.0;

/// Per-corner values in wire order (RL, RR, FL, FR)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Corners<T> {
    pub rear_left: T,
    pub rear_right: T,
    pub front_left: T,
    pub front_right: T,
}

impl<T: Copy> Corners<T> {
    /// Build from the wire ordering used by every per-corner array.
    pub fn from_wire([rl, rr, fl, fr]: [T; 4]) -> Self {
        Self {
            rear_left: rl,
            rear_right: rr,
            front_left: fl,
            front_right: fr,
        }
    }

    pub fn values(&self) -> [T; 4] {
        [
            self.rear_left,
            self.rear_right,
            self.front_left,
            self.front_right,
        ]
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Corners<U> {
        let [rl, rr, fl, fr] = self.values();
        Corners::from_wire([f(rl), f(rr), f(fl), f(fr)])
    }
}

impl Corners<f32> {
    pub fn max(&self) -> f32 {
        self.values().into_iter().fold(0.0, f32::max)
    }

    pub fn average(&self) -> f32 {
        self.values().iter().sum::<f32>() / 4.0
    }
}

/// Named damage components the engine alerts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageComponent {
    FrontWing,
    RearWing,
    Floor,
    Diffuser,
    Sidepods,
}

impl DamageComponent {
    pub const ALL: [DamageComponent; 5] = [
        DamageComponent::FrontWing,
        DamageComponent::RearWing,
        DamageComponent::Floor,
        DamageComponent::Diffuser,
        DamageComponent::Sidepods,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DamageComponent::FrontWing => "front_wing",
            DamageComponent::RearWing => "rear_wing",
            DamageComponent::Floor => "floor",
            DamageComponent::Diffuser => "diffuser",
            DamageComponent::Sidepods => "sidepods",
        }
    }
}

/// Component damage severities, 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageState {
    pub front_wing: f32,
    pub rear_wing: f32,
    pub floor: f32,
    pub diffuser: f32,
    pub sidepods: f32,
}

impl DamageState {
    pub fn get(&self, component: DamageComponent) -> f32 {
        match component {
            DamageComponent::FrontWing => self.front_wing,
            DamageComponent::RearWing => self.rear_wing,
            DamageComponent::Floor => self.floor,
            DamageComponent::Diffuser => self.diffuser,
            DamageComponent::Sidepods => self.sidepods,
        }
    }

    /// Worst single component
    pub fn worst(&self) -> f32 {
        DamageComponent::ALL
            .iter()
            .map(|c| self.get(*c))
            .fold(0.0, f32::max)
    }
}

/// One weather forecast sample from the session packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastSample {
    pub session_type: u8,
    /// Minutes from now
    pub time_offset_min: u8,
    pub weather: u8,
    pub rain_percentage: u8,
}

impl ForecastSample {
    pub fn is_wet(&self) -> bool {
        self.weather >= WET_WEATHER_CODE
    }
}

/// Full state for one tracked competitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompetitorState {
    // === Identity ===
    pub car_index: u8,
    /// External account identifier bound to this slot, if configured
    pub account_id: Option<String>,
    pub driver_name: String,

    // === Session ===
    pub session_type_raw: u8,
    pub session_kind: SessionKind,
    pub track_id: i8,
    pub total_laps: u8,
    pub track_length_m: u16,
    pub track_temp_c: i8,
    pub air_temp_c: i8,
    pub total_participants: u8,

    // === Position / gaps ===
    pub position: u8,
    /// Position before the most recent change
    pub prev_position: u8,
    pub grid_position: u8,
    pub gap_ahead_s: f32,
    pub prev_gap_ahead_s: f32,
    pub gap_behind_s: f32,
    pub gap_to_leader_s: f32,

    // === Lap progress ===
    pub current_lap: u8,
    pub current_lap_time_ms: u32,
    pub last_lap_time_ms: u32,
    pub best_lap_time_ms: u32,
    /// 1-based sector the car is currently in
    pub sector: u8,
    pub sector1_ms: u32,
    pub sector2_ms: u32,
    pub last_lap_sector1_ms: u32,
    pub last_lap_sector2_ms: u32,
    pub lap_distance_m: f32,
    pub lap_invalid: bool,
    pub pit_status: u8,
    pub num_pit_stops: u8,
    pub driver_status: u8,

    // === Tyres ===
    /// Wear percentage per corner, clamped to [0, 100]
    pub tyre_wear: Corners<f32>,
    pub tyre_inner_temp_c: Corners<f32>,
    pub visual_compound: u8,
    pub tyre_age_laps: u8,
    /// Lap on which the current set was fitted (0 = unknown)
    pub tyre_change_lap: u8,

    // === Fuel ===
    pub fuel_mass_kg: f32,
    pub fuel_remaining_laps: f32,
    pub fuel_mix: u8,

    // === ERS ===
    /// Stored energy as a fraction of the full store
    pub ers_store_fraction: f32,
    pub ers_deploy_mode: u8,

    // === Damage ===
    pub damage: DamageState,

    // === Flags ===
    /// FIA flag code (-1 unknown, 0 none, 1 green, 2 blue, 3 yellow, 4 red)
    pub fia_flag: i8,
    pub safety_car_status: u8,
    pub yellow_sector: Option<u8>,
    pub drs_allowed: bool,
    pub drs_open: bool,

    // === Penalties ===
    pub penalty_seconds: u8,
    pub warnings: u8,
    pub unserved_drive_through: u8,
    pub unserved_stop_go: u8,

    // === Speed ===
    pub speed_kph: u16,
    pub max_speed_this_lap_kph: u16,

    // === Weather ===
    pub weather: u8,
    pub forecast: Vec<ForecastSample>,

    pub session_finished: bool,
}

impl CompetitorState {
    pub fn new(car_index: u8) -> Self {
        Self {
            car_index,
            fia_flag: -1,
            ..Default::default()
        }
    }

    pub fn max_tyre_wear(&self) -> f32 {
        self.tyre_wear.max()
    }

    pub fn ers_percent(&self) -> f32 {
        self.ers_store_fraction * 100.0
    }

    pub fn is_wet(&self) -> bool {
        self.weather >= WET_WEATHER_CODE
    }

    /// A wet forecast sample inside the lookahead window
    pub fn approaching_rain(&self) -> bool {
        self.forecast
            .iter()
            .any(|s| s.is_wet() && s.time_offset_min <= FORECAST_LOOKAHEAD_MINUTES)
    }

    pub fn is_final_lap(&self) -> bool {
        self.total_laps > 0 && self.current_lap >= self.total_laps
    }

    /// Laps completed so far
    pub fn completed_laps(&self) -> u8 {
        self.current_lap.saturating_sub(1)
    }

    pub fn in_pit(&self) -> bool {
        matches!(self.pit_status, 1 | 2)
    }

    pub fn lap_fraction(&self) -> Option<f32> {
        if self.track_length_m == 0 || self.lap_distance_m < 0.0 {
            return None;
        }
        Some((self.lap_distance_m / f32::from(self.track_length_m)).clamp(0.0, 1.0))
    }
}

/// Per-slot view of any car in the field
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CarSnapshot {
    pub car_index: u8,
    pub position: u8,
    pub current_lap: u8,
    pub pit_status: u8,
    pub gap_ahead_s: f32,
    pub gap_to_leader_s: f32,
    /// Worst component damage, 0-100
    pub max_damage: f32,
}

impl CarSnapshot {
    pub fn in_pit(&self) -> bool {
        matches!(self.pit_status, 1 | 2)
    }
}

// =============================================================================
// Display names for coded values
// =============================================================================

const TRACK_NAMES: &[&str] = &[
    "Melbourne",
    "Paul Ricard",
    "Shanghai",
    "Sakhir (Bahrain)",
    "Catalunya",
    "Monaco",
    "Montreal",
    "Silverstone",
    "Hockenheim",
    "Hungaroring",
    "Spa",
    "Monza",
    "Singapore",
    "Suzuka",
    "Abu Dhabi",
    "Texas",
    "Brazil",
    "Austria",
    "Sochi",
    "Mexico",
    "Baku (Azerbaijan)",
    "Sakhir Short",
    "Silverstone Short",
    "Texas Short",
    "Suzuka Short",
    "Hanoi",
    "Zandvoort",
    "Imola",
    "Portimao",
    "Jeddah",
    "Miami",
    "Las Vegas",
    "Losail",
];

/// Track display name, "Unknown" for unmapped or negative ids
pub fn track_name(track_id: i8) -> &'static str {
    usize::try_from(track_id)
        .ok()
        .and_then(|idx| TRACK_NAMES.get(idx))
        .copied()
        .unwrap_or("Unknown")
}

pub fn compound_name(visual_compound: u8) -> &'static str {
    match visual_compound {
        16 => "Soft",
        17 => "Medium",
        18 => "Hard",
        7 => "Inter",
        8 => "Wet",
        19 => "C1",
        20 => "C2",
        21 => "C3",
        22 => "C4",
        23 => "C5",
        _ => "Unknown",
    }
}

pub fn weather_name(weather: u8) -> &'static str {
    match weather {
        0 => "clear",
        1 => "light cloud",
        2 => "overcast",
        3 => "light rain",
        4 => "heavy rain",
        5 => "storm",
        _ => "unknown",
    }
}

pub fn safety_car_name(status: u8) -> &'static str {
    match status {
        0 => "none",
        1 => "full safety car",
        2 => "virtual safety car",
        3 => "formation lap",
        _ => "unknown",
    }
}

pub fn fuel_mix_name(mix: u8) -> &'static str {
    match mix {
        0 => "lean",
        1 => "standard",
        2 => "rich",
        3 => "max",
        _ => "unknown",
    }
}

pub fn ers_mode_name(mode: u8) -> &'static str {
    match mode {
        0 => "none",
        1 => "medium",
        2 => "hotlap",
        3 => "overtake",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_wire_order() {
        let c = Corners::from_wire([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(c.rear_left, 1.0);
        assert_eq!(c.front_right, 4.0);
        assert_eq!(c.max(), 4.0);
        assert_eq!(c.average(), 2.5);
    }

    #[test]
    fn test_track_name_bounds() {
        assert_eq!(track_name(7), "Silverstone");
        assert_eq!(track_name(-1), "Unknown");
        assert_eq!(track_name(120), "Unknown");
    }

    #[test]
    fn test_approaching_rain_respects_lookahead() {
        let mut state = CompetitorState::new(0);
        state.forecast = vec![ForecastSample {
            time_offset_min: 30,
            weather: 4,
            ..Default::default()
        }];
        assert!(!state.approaching_rain());

        state.forecast.push(ForecastSample {
            time_offset_min: 10,
            weather: 3,
            ..Default::default()
        });
        assert!(state.approaching_rain());
    }

    #[test]
    fn test_damage_worst() {
        let damage = DamageState {
            floor: 35.0,
            front_wing: 12.0,
            ..Default::default()
        };
        assert_eq!(damage.worst(), 35.0);
    }
}
