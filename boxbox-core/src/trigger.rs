//! Trigger kinds and their static tables
//!
//! Every kind carries an explicit priority (lower = more urgent, preempts
//! more), a cooldown policy, the session kinds it may fire in, a prompt
//! template for the text generator and a fallback radio line.

use crate::session::SessionKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interrupt threshold: priorities at or below this may preempt.
pub const DEFAULT_INTERRUPT_THRESHOLD: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    CriticalFuel,
    CriticalTyres,
    Damage,
    RedFlag,
    SafetyCarDeployed,
    SafetyCarEnding,
    VscDeployed,
    VscEnding,
    BlueFlag,
    YellowFlag,
    Penalty,
    RainStarts,
    WeatherIncoming,
    FuelLow,
    TyreWarning,
    TyreTempImbalance,
    NearbyCarDamage,
    Defend,
    FinalLap,
    RaceFinished,
    GapClosing,
    UndercutOpportunity,
    OvercutOpportunity,
    PitWindowOptimal,
    PositionGained,
    PositionLost,
    GapCloseAhead,
    SessionStart,
    ChequeredFlag,
    QualiLapStart,
    SpeedTrap,
    PersonalBest,
    RivalPitted,
}

/// How a kind is rate limited after it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cooldown {
    /// Re-fire allowed once the duration has elapsed
    Timed(Duration),
    /// Gated by a one-shot flag or a state transition, never by a timer
    Transition,
}

const fn secs(s: u64) -> Cooldown {
    Cooldown::Timed(Duration::from_secs(s))
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 33] = [
        TriggerKind::CriticalFuel,
        TriggerKind::CriticalTyres,
        TriggerKind::Damage,
        TriggerKind::RedFlag,
        TriggerKind::SafetyCarDeployed,
        TriggerKind::SafetyCarEnding,
        TriggerKind::VscDeployed,
        TriggerKind::VscEnding,
        TriggerKind::BlueFlag,
        TriggerKind::YellowFlag,
        TriggerKind::Penalty,
        TriggerKind::RainStarts,
        TriggerKind::WeatherIncoming,
        TriggerKind::FuelLow,
        TriggerKind::TyreWarning,
        TriggerKind::TyreTempImbalance,
        TriggerKind::NearbyCarDamage,
        TriggerKind::Defend,
        TriggerKind::FinalLap,
        TriggerKind::RaceFinished,
        TriggerKind::GapClosing,
        TriggerKind::UndercutOpportunity,
        TriggerKind::OvercutOpportunity,
        TriggerKind::PitWindowOptimal,
        TriggerKind::PositionGained,
        TriggerKind::PositionLost,
        TriggerKind::GapCloseAhead,
        TriggerKind::SessionStart,
        TriggerKind::ChequeredFlag,
        TriggerKind::QualiLapStart,
        TriggerKind::SpeedTrap,
        TriggerKind::PersonalBest,
        TriggerKind::RivalPitted,
    ];

    /// Default priority. Written out rather than derived from the
    /// discriminant so reordering variants cannot silently change it.
    pub fn priority(self) -> u8 {
        match self {
            TriggerKind::CriticalFuel => 1,
            TriggerKind::CriticalTyres => 2,
            TriggerKind::Damage => 3,
            TriggerKind::RedFlag => 4,
            TriggerKind::SafetyCarDeployed => 5,
            TriggerKind::SafetyCarEnding => 6,
            TriggerKind::VscDeployed => 7,
            TriggerKind::VscEnding => 8,
            TriggerKind::BlueFlag => 9,
            TriggerKind::YellowFlag => 10,
            TriggerKind::Penalty => 11,
            TriggerKind::RainStarts => 12,
            TriggerKind::WeatherIncoming => 13,
            TriggerKind::FuelLow => 14,
            TriggerKind::TyreWarning => 15,
            TriggerKind::TyreTempImbalance => 16,
            TriggerKind::NearbyCarDamage => 17,
            TriggerKind::Defend => 18,
            TriggerKind::FinalLap => 19,
            TriggerKind::RaceFinished => 20,
            TriggerKind::GapClosing => 21,
            TriggerKind::UndercutOpportunity => 22,
            TriggerKind::OvercutOpportunity => 23,
            TriggerKind::PitWindowOptimal => 24,
            TriggerKind::PositionGained => 25,
            TriggerKind::PositionLost => 26,
            TriggerKind::GapCloseAhead => 27,
            TriggerKind::SessionStart => 28,
            TriggerKind::ChequeredFlag => 29,
            TriggerKind::QualiLapStart => 30,
            TriggerKind::SpeedTrap => 31,
            TriggerKind::PersonalBest => 32,
            TriggerKind::RivalPitted => 33,
        }
    }

    pub fn cooldown(self) -> Cooldown {
        match self {
            TriggerKind::CriticalFuel => secs(90),
            TriggerKind::CriticalTyres => secs(60),
            TriggerKind::BlueFlag => secs(60),
            TriggerKind::YellowFlag => secs(120),
            TriggerKind::Penalty => secs(45),
            TriggerKind::RainStarts => secs(300),
            TriggerKind::WeatherIncoming => secs(240),
            TriggerKind::FuelLow => secs(240),
            TriggerKind::TyreWarning => secs(120),
            TriggerKind::TyreTempImbalance => secs(150),
            TriggerKind::NearbyCarDamage => secs(180),
            TriggerKind::Defend => secs(60),
            TriggerKind::GapClosing => secs(60),
            TriggerKind::UndercutOpportunity | TriggerKind::OvercutOpportunity => secs(120),
            TriggerKind::PitWindowOptimal => secs(180),
            TriggerKind::PositionGained | TriggerKind::PositionLost => secs(30),
            TriggerKind::GapCloseAhead => secs(60),
            TriggerKind::QualiLapStart => secs(60),
            TriggerKind::SpeedTrap => secs(90),
            TriggerKind::RivalPitted => secs(120),
            TriggerKind::Damage
            | TriggerKind::RedFlag
            | TriggerKind::SafetyCarDeployed
            | TriggerKind::SafetyCarEnding
            | TriggerKind::VscDeployed
            | TriggerKind::VscEnding
            | TriggerKind::FinalLap
            | TriggerKind::RaceFinished
            | TriggerKind::SessionStart
            | TriggerKind::ChequeredFlag
            | TriggerKind::PersonalBest => Cooldown::Transition,
        }
    }

    /// Urgent enough to interrupt routine chatter
    pub fn is_urgent(self, interrupt_threshold: u8) -> bool {
        self.priority() <= interrupt_threshold
    }

    /// Kinds that may still fire during the startup grace period
    pub fn allowed_during_grace(self) -> bool {
        matches!(
            self,
            TriggerKind::RedFlag
                | TriggerKind::SafetyCarDeployed
                | TriggerKind::VscDeployed
                | TriggerKind::SessionStart
                | TriggerKind::Penalty
        )
    }

    /// Session gating. `Unknown` gets the practice list; `Unset` allows nothing.
    pub fn allowed_in(self, session: SessionKind) -> bool {
        match session {
            SessionKind::Unset => false,
            SessionKind::Practice | SessionKind::Unknown => PRACTICE.contains(&self),
            SessionKind::Qualifying | SessionKind::SprintShootout => QUALIFYING.contains(&self),
            SessionKind::SprintRace => SPRINT_RACE.contains(&self),
            SessionKind::Race => !matches!(self, TriggerKind::QualiLapStart | TriggerKind::SpeedTrap),
            SessionKind::TimeTrial => TIME_TRIAL.contains(&self),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TriggerKind::CriticalFuel => "CRITICAL_FUEL",
            TriggerKind::CriticalTyres => "CRITICAL_TYRES",
            TriggerKind::Damage => "DAMAGE",
            TriggerKind::RedFlag => "RED_FLAG",
            TriggerKind::SafetyCarDeployed => "SAFETY_CAR_DEPLOYED",
            TriggerKind::SafetyCarEnding => "SAFETY_CAR_ENDING",
            TriggerKind::VscDeployed => "VSC_DEPLOYED",
            TriggerKind::VscEnding => "VSC_ENDING",
            TriggerKind::BlueFlag => "BLUE_FLAG",
            TriggerKind::YellowFlag => "YELLOW_FLAG",
            TriggerKind::Penalty => "PENALTY",
            TriggerKind::RainStarts => "RAIN_STARTS",
            TriggerKind::WeatherIncoming => "WEATHER_INCOMING",
            TriggerKind::FuelLow => "FUEL_LOW",
            TriggerKind::TyreWarning => "TYRE_WARNING",
            TriggerKind::TyreTempImbalance => "TYRE_TEMP_IMBALANCE",
            TriggerKind::NearbyCarDamage => "NEARBY_CAR_DAMAGE",
            TriggerKind::Defend => "DEFEND",
            TriggerKind::FinalLap => "FINAL_LAP",
            TriggerKind::RaceFinished => "RACE_FINISHED",
            TriggerKind::GapClosing => "GAP_CLOSING",
            TriggerKind::UndercutOpportunity => "UNDERCUT_OPPORTUNITY",
            TriggerKind::OvercutOpportunity => "OVERCUT_OPPORTUNITY",
            TriggerKind::PitWindowOptimal => "PIT_WINDOW_OPTIMAL",
            TriggerKind::PositionGained => "POSITION_GAINED",
            TriggerKind::PositionLost => "POSITION_LOST",
            TriggerKind::GapCloseAhead => "GAP_CLOSE_AHEAD",
            TriggerKind::SessionStart => "SESSION_START",
            TriggerKind::ChequeredFlag => "CHEQUERED_FLAG",
            TriggerKind::QualiLapStart => "QUALI_LAP_START",
            TriggerKind::SpeedTrap => "SPEED_TRAP",
            TriggerKind::PersonalBest => "PERSONAL_BEST",
            TriggerKind::RivalPitted => "RIVAL_PITTED",
        }
    }

    /// Spoken line used when text generation fails or times out
    pub fn fallback_line(self) -> &'static str {
        match self {
            TriggerKind::SessionStart => "Radio check, we're live. Clean laps first, look after the tyres.",
            TriggerKind::CriticalTyres => "Box this lap, box this lap. The tyres are finished.",
            TriggerKind::TyreWarning => "Tyre wear is climbing. Start looking after them in the long corners.",
            TriggerKind::TyreTempImbalance => "One tyre is running hot. Keep the inputs smooth.",
            TriggerKind::CriticalFuel => "Fuel is critical. Lift and coast every braking zone.",
            TriggerKind::FuelLow => "Fuel is getting tight. Lift and coast into the heavy stops.",
            TriggerKind::Defend => "Car behind is closing. Cover the inside.",
            TriggerKind::GapCloseAhead => "You're catching the car ahead. Keep the pressure on.",
            TriggerKind::GapClosing => "The gap is coming down lap by lap. Stay on it.",
            TriggerKind::PositionGained => "Nice move, position gained. Keep it tidy.",
            TriggerKind::PositionLost => "Lost a place. Reset and go again, the pace is there.",
            TriggerKind::SafetyCarDeployed => "Safety car, safety car. Stay on the delta and hold position.",
            TriggerKind::SafetyCarEnding => "Safety car in this lap. Get heat in the tyres and be ready.",
            TriggerKind::VscDeployed => "Virtual safety car. Slow to the delta.",
            TriggerKind::VscEnding => "VSC ending. Tyres up to temperature, be ready to go.",
            TriggerKind::RedFlag => "Red flag, red flag. Slow down and bring it to the pit lane.",
            TriggerKind::YellowFlag => "Yellow flag ahead. No overtaking, lift off.",
            TriggerKind::BlueFlag => "Blue flag. Let the leaders through cleanly.",
            TriggerKind::RaceFinished => "That's the session done. Good work, bring it home.",
            TriggerKind::Damage => "We're seeing damage on the car. Adjust your inputs and report the handling.",
            TriggerKind::WeatherIncoming => "Rain is on the way. Stay sharp on strategy.",
            TriggerKind::RainStarts => "It's raining now. Box for inters.",
            TriggerKind::PitWindowOptimal => "We're in the pit window. Box when you're ready.",
            TriggerKind::UndercutOpportunity => "Undercut is on. Box now and we jump them.",
            TriggerKind::OvercutOpportunity => "Stay out, the overcut is in play.",
            TriggerKind::FinalLap => "Final lap. Everything you've got.",
            TriggerKind::ChequeredFlag => "Chequered flag. Cool down lap, well driven.",
            TriggerKind::QualiLapStart => "Push lap now. Clean through the first sector.",
            TriggerKind::Penalty => "We have a penalty. Keep your head down, we'll manage it.",
            TriggerKind::NearbyCarDamage => "Car ahead is damaged. Close in and pressure them.",
            TriggerKind::SpeedTrap => "New top speed. Good exit onto the straight.",
            TriggerKind::PersonalBest => "Personal best. Lovely lap, keep that rhythm.",
            TriggerKind::RivalPitted => "Car ahead has pitted. Push now, this is our track position.",
        }
    }

    /// Word and tone instruction for the text generator. `{key}` placeholders
    /// are filled from the event context.
    pub fn prompt_template(self) -> &'static str {
        match self {
            TriggerKind::SessionStart => "Session is starting at {track}. Short welcome, one focus point for the session. Under 20 words.",
            TriggerKind::CriticalTyres => "Tyre wear is critical at {max_wear}% (projected {projected_wear}%). Call the driver in this lap. Urgent. Under 12 words.",
            TriggerKind::TyreWarning => "Projected tyre wear {projected_wear}% by the flag. One management tip. Calm. Under 18 words.",
            TriggerKind::TyreTempImbalance => "The {hot_corner} tyre is {imbalance_c}C above the average. One driving adjustment. Under 15 words.",
            TriggerKind::CriticalFuel => "Only {fuel_remaining_laps} laps of fuel left. Tell the driver to lift and coast hard. Urgent. Under 12 words.",
            TriggerKind::FuelLow => "Fuel for {fuel_remaining_laps} laps remaining. Advise fuel saving. Under 15 words.",
            TriggerKind::Defend => "Car behind is {gap_behind}s back and closing. Tell the driver to defend. Under 12 words.",
            TriggerKind::GapCloseAhead => "Gap ahead dropped by {gap_delta}s to {gap_ahead}s. Encourage the attack. Under 15 words.",
            TriggerKind::GapClosing => "Gap ahead is steadily closing, now {gap_ahead}s. One tip referencing the track. Under 18 words.",
            TriggerKind::PositionGained => "Driver gained a place, now P{position}. Brief genuine praise. Under 12 words.",
            TriggerKind::PositionLost => "Driver lost a place, now P{position} of {total_cars}. Calm, one instruction to recover. Under 15 words.",
            TriggerKind::SafetyCarDeployed => "Safety car deployed. P{position}, fuel {fuel_remaining_laps} laps, max wear {max_wear}%. Hold position, one strategic call. Under 25 words.",
            TriggerKind::SafetyCarEnding => "Safety car in this lap. P{position} on {tyre_compound}. Warm the tyres, name one restart target. Under 22 words.",
            TriggerKind::VscDeployed => "Virtual safety car deployed. Slow to the delta, hold position, mention pitting if tyres allow. Under 20 words.",
            TriggerKind::VscEnding => "VSC ending. Tyre warm-up and be ready for green. Under 15 words.",
            TriggerKind::RedFlag => "Red flag. Slow down, return to the pit lane. Under 12 words.",
            TriggerKind::YellowFlag => "Yellow flag in {yellow_sector_text}. No overtaking, reduce speed. Never guess a sector. Under 15 words.",
            TriggerKind::BlueFlag => "Blue flag on lap {lap}. Let the faster car through cleanly. Under 12 words.",
            TriggerKind::RaceFinished => "Session over, {session} finished P{position} of {total_cars}. One warm closing line to {driver}. Under 20 words.",
            TriggerKind::Damage => "{level}% damage on the {component}. One driving-style adjustment. Under 18 words.",
            TriggerKind::WeatherIncoming => "Rain expected within {minutes_to_rain} minutes. Tyre strategy call. Under 18 words.",
            TriggerKind::RainStarts => "It is raining on track, weather {weather}. Call for intermediates or wets. Under 12 words.",
            TriggerKind::PitWindowOptimal => "In the pit window, projected wear {projected_wear}%. Advise on boxing this lap. Under 18 words.",
            TriggerKind::UndercutOpportunity => "Car behind {gap_behind}s, our tyres at {max_wear}%. Advise the undercut. Under 18 words.",
            TriggerKind::OvercutOpportunity => "Car ahead {gap_ahead}s, our tyres fresher at {max_wear}%. Advise the overcut. Under 18 words.",
            TriggerKind::FinalLap => "Final lap, P{position}. One motivational push. Under 12 words.",
            TriggerKind::ChequeredFlag => "Chequered flag. Concise professional sign-off. Under 15 words.",
            TriggerKind::QualiLapStart => "Starting qualifying lap on {tyre_compound}. One focus area. Under 20 words.",
            TriggerKind::Penalty => "Penalty now {penalty_seconds}s total, drive-throughs {drive_throughs}, stop-gos {stop_gos}. Calm and clear. Under 20 words.",
            TriggerKind::NearbyCarDamage => "Car ahead has {ahead_damage_pct}% damage and is {ahead_gap_s}s ahead. Push to pressure them. Under 18 words.",
            TriggerKind::SpeedTrap => "New top speed {top_speed_kph} km/h, say the number in words. Under 15 words.",
            TriggerKind::PersonalBest => "New personal best, {improvement_ms}ms faster. Speak the time naturally, no raw milliseconds. Under 15 words.",
            TriggerKind::RivalPitted => "Car ahead from P{rival_position} has pitted. One decisive instruction. Under 20 words.",
        }
    }
}

const PRACTICE: &[TriggerKind] = &[
    TriggerKind::SessionStart,
    TriggerKind::CriticalTyres,
    TriggerKind::TyreWarning,
    TriggerKind::TyreTempImbalance,
    TriggerKind::CriticalFuel,
    TriggerKind::Damage,
    TriggerKind::RainStarts,
    TriggerKind::WeatherIncoming,
    TriggerKind::ChequeredFlag,
    TriggerKind::RaceFinished,
    TriggerKind::RedFlag,
    TriggerKind::YellowFlag,
    TriggerKind::SafetyCarDeployed,
    TriggerKind::SafetyCarEnding,
    TriggerKind::VscDeployed,
    TriggerKind::VscEnding,
    TriggerKind::BlueFlag,
    TriggerKind::Penalty,
];

// Qualifying fuel loads are always minimal, so no fuel triggers here.
const QUALIFYING: &[TriggerKind] = &[
    TriggerKind::SessionStart,
    TriggerKind::QualiLapStart,
    TriggerKind::CriticalTyres,
    TriggerKind::TyreWarning,
    TriggerKind::TyreTempImbalance,
    TriggerKind::Damage,
    TriggerKind::RainStarts,
    TriggerKind::WeatherIncoming,
    TriggerKind::ChequeredFlag,
    TriggerKind::RaceFinished,
    TriggerKind::RedFlag,
    TriggerKind::YellowFlag,
    TriggerKind::SafetyCarDeployed,
    TriggerKind::SafetyCarEnding,
    TriggerKind::VscDeployed,
    TriggerKind::VscEnding,
    TriggerKind::BlueFlag,
    TriggerKind::Penalty,
    TriggerKind::SpeedTrap,
    TriggerKind::PersonalBest,
];

const SPRINT_RACE: &[TriggerKind] = &[
    TriggerKind::SessionStart,
    TriggerKind::CriticalTyres,
    TriggerKind::TyreWarning,
    TriggerKind::TyreTempImbalance,
    TriggerKind::CriticalFuel,
    TriggerKind::FuelLow,
    TriggerKind::Damage,
    TriggerKind::RainStarts,
    TriggerKind::WeatherIncoming,
    TriggerKind::Defend,
    TriggerKind::GapCloseAhead,
    TriggerKind::GapClosing,
    TriggerKind::PositionGained,
    TriggerKind::PositionLost,
    TriggerKind::FinalLap,
    TriggerKind::ChequeredFlag,
    TriggerKind::RaceFinished,
    TriggerKind::RedFlag,
    TriggerKind::YellowFlag,
    TriggerKind::SafetyCarDeployed,
    TriggerKind::SafetyCarEnding,
    TriggerKind::VscDeployed,
    TriggerKind::VscEnding,
    TriggerKind::BlueFlag,
    TriggerKind::Penalty,
    TriggerKind::NearbyCarDamage,
];

const TIME_TRIAL: &[TriggerKind] = &[
    TriggerKind::SessionStart,
    TriggerKind::CriticalTyres,
    TriggerKind::TyreWarning,
    TriggerKind::TyreTempImbalance,
    TriggerKind::CriticalFuel,
    TriggerKind::Damage,
    TriggerKind::ChequeredFlag,
    TriggerKind::RaceFinished,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_are_unique_and_follow_declaration_order() {
        for (idx, kind) in TriggerKind::ALL.iter().enumerate() {
            assert_eq!(kind.priority() as usize, idx + 1, "{:?}", kind);
        }
    }

    #[test]
    fn test_interrupt_threshold_boundary() {
        assert!(TriggerKind::Penalty.is_urgent(DEFAULT_INTERRUPT_THRESHOLD));
        assert!(!TriggerKind::RainStarts.is_urgent(DEFAULT_INTERRUPT_THRESHOLD));
    }

    #[test]
    fn test_qualifying_excludes_fuel() {
        assert!(!TriggerKind::FuelLow.allowed_in(SessionKind::Qualifying));
        assert!(!TriggerKind::CriticalFuel.allowed_in(SessionKind::SprintShootout));
        assert!(TriggerKind::FuelLow.allowed_in(SessionKind::Race));
    }

    #[test]
    fn test_sprint_excludes_pit_strategy() {
        for kind in [
            TriggerKind::UndercutOpportunity,
            TriggerKind::OvercutOpportunity,
            TriggerKind::PitWindowOptimal,
        ] {
            assert!(!kind.allowed_in(SessionKind::SprintRace));
            assert!(kind.allowed_in(SessionKind::Race));
        }
    }

    #[test]
    fn test_unknown_session_uses_practice_list() {
        for kind in TriggerKind::ALL {
            assert_eq!(
                kind.allowed_in(SessionKind::Unknown),
                kind.allowed_in(SessionKind::Practice)
            );
        }
    }

    #[test]
    fn test_every_kind_has_a_fallback() {
        for kind in TriggerKind::ALL {
            assert!(!kind.fallback_line().is_empty());
            assert!(!kind.prompt_template().is_empty());
        }
    }
}
