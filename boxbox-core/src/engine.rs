//! Trigger evaluation engine
//!
//! Runs once per tick for every tracked competitor. Each condition family is
//! checked independently against the competitor's state and the engine's
//! private per-competitor memory (`TriggerState`); fired candidates are
//! filtered by session kind and the startup grace period, sorted by priority
//! and capped.
//!
//! Time is passed in explicitly so cooldowns are testable.

use crate::context::{base_context, round2};
use crate::event::{AdvisoryEvent, EventContext};
use crate::model::{CarSnapshot, CompetitorState, DamageComponent};
use crate::session::SessionKind;
use crate::store::find_by_position;
use crate::trigger::{Cooldown, TriggerKind};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// =============================================================================
// Thresholds
// =============================================================================

const CRITICAL_PROJECTED_WEAR: f32 = 95.0;
const WARNING_PROJECTED_WEAR: f32 = 78.0;
const WEAR_GROWTH_FOR_REWARN: f32 = 5.0;
const TEMP_IMBALANCE_C: f32 = 20.0;

const CRITICAL_FUEL_LAPS: f32 = 0.5;
const LOW_FUEL_LAPS: f32 = 2.0;
const FUEL_DROP_FOR_REWARN: f32 = 0.3;

const DEFEND_GAP_S: f32 = 1.0;
const DEFEND_SHRINK_S: f32 = 0.05;
/// Defend tracker value meaning "nobody close behind"
const FAR_GAP_S: f32 = 999.0;

const GAP_CLOSE_AHEAD_S: f32 = 0.3;
const GAP_CLOSING_TICKS: u8 = 3;
const GAP_TREND_ALPHA: f32 = 0.25;

const DAMAGE_ALERT: f32 = 20.0;
const NEARBY_DAMAGE_ALERT: f32 = 40.0;
const NEARBY_DAMAGE_CLEAR: f32 = 20.0;
const NEARBY_GAP_S: f32 = 3.0;

const UNDERCUT_GAP_S: f32 = 2.0;
const OVERCUT_GAP_S: f32 = 2.5;
const RIVAL_PIT_GAP_S: f32 = 5.0;

const SPEED_TRAP_FLOOR_KPH: u16 = 200;
const SPEED_TRAP_MARGIN_KPH: u16 = 2;

const PENALTY_COLD_START_S: u8 = 5;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Only a small always-allowed subset may fire before this has elapsed
    pub grace_period: Duration,
    /// Anti-spam cap per competitor per tick
    pub max_events_per_tick: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(25),
            max_events_per_tick: 2,
        }
    }
}

// =============================================================================
// Pure helpers
// =============================================================================

/// Linear extrapolation of tyre wear to the end of the race.
///
/// With fewer than two completed laps or an unknown race length the current
/// wear is returned unchanged.
pub fn project_wear(current_max_wear: f32, completed_laps: u8, total_laps: u8) -> f32 {
    if completed_laps < 2 || total_laps == 0 || current_max_wear <= 0.0 {
        return current_max_wear;
    }
    let rate = current_max_wear / f32::from(completed_laps);
    let remaining = f32::from(total_laps.saturating_sub(completed_laps));
    (current_max_wear + rate * remaining).min(100.0)
}

/// Wear at which tyres are critical regardless of projection: shorter races
/// tolerate more, clamped to 60-85.
pub fn critical_wear_threshold(total_laps: u8) -> f32 {
    (100.0 - 0.5 * f32::from(total_laps)).clamp(60.0, 85.0)
}

fn pit_window_threshold(total_laps: f32) -> f32 {
    (900.0 / total_laps).clamp(35.0, 50.0)
}

fn undercut_min_wear(total_laps: f32) -> f32 {
    total_laps.clamp(30.0, 50.0)
}

fn overcut_max_wear(total_laps: f32) -> f32 {
    (0.8 * total_laps).clamp(20.0, 40.0)
}

fn facts(value: Value) -> EventContext {
    match value {
        Value::Object(map) => map,
        _ => EventContext::new(),
    }
}

fn sector_text(sector: Option<u8>) -> &'static str {
    match sector {
        Some(1) => "sector one",
        Some(2) => "sector two",
        Some(3) => "sector three",
        _ => "this sector",
    }
}

// =============================================================================
// Per-competitor engine memory
// =============================================================================

/// Engine-private memory for one competitor
#[derive(Debug, Clone)]
pub struct TriggerState {
    ready_at: HashMap<TriggerKind, Instant>,
    last_fired_lap: HashMap<TriggerKind, u8>,

    session_start_fired: bool,
    final_lap_fired: bool,
    chequered_fired: bool,
    race_finished_fired: bool,

    fired_damage: HashSet<DamageComponent>,
    /// Positions of damaged cars ahead already called out
    alerted_cars_ahead: HashSet<u8>,

    last_safety_car: Option<u8>,
    last_fia_flag: Option<i8>,
    last_penalty: u8,
    penalty_seen: bool,
    best_speed_kph: u16,
    last_best_lap_ms: u32,
    last_rival_pit_position: u8,

    last_fuel_alert_laps: Option<f32>,
    last_tyre_alert_wear: f32,
    last_defend_gap: f32,

    last_tick_position: Option<u8>,
    last_tick_gap_ahead: Option<f32>,
    closing_ticks: u8,
    closing_total: f32,
    /// EWMA of per-tick gap-ahead reduction (positive = closing)
    gap_trend: f32,

    unknown_session_warned: bool,
}

impl Default for TriggerState {
    fn default() -> Self {
        Self {
            ready_at: HashMap::new(),
            last_fired_lap: HashMap::new(),
            session_start_fired: false,
            final_lap_fired: false,
            chequered_fired: false,
            race_finished_fired: false,
            fired_damage: HashSet::new(),
            alerted_cars_ahead: HashSet::new(),
            last_safety_car: None,
            last_fia_flag: None,
            last_penalty: 0,
            penalty_seen: false,
            best_speed_kph: 0,
            last_best_lap_ms: 0,
            last_rival_pit_position: 0,
            last_fuel_alert_laps: None,
            last_tyre_alert_wear: 0.0,
            last_defend_gap: FAR_GAP_S,
            last_tick_position: None,
            last_tick_gap_ahead: None,
            closing_ticks: 0,
            closing_total: 0.0,
            gap_trend: 0.0,
            unknown_session_warned: false,
        }
    }
}

impl TriggerState {
    pub fn gap_trend(&self) -> f32 {
        self.gap_trend
    }

    fn ready(&self, kind: TriggerKind, now: Instant) -> bool {
        match kind.cooldown() {
            Cooldown::Transition => true,
            Cooldown::Timed(_) => self.ready_at.get(&kind).map_or(true, |at| now >= *at),
        }
    }

    fn arm(&mut self, kind: TriggerKind, now: Instant) {
        if let Cooldown::Timed(cooldown) = kind.cooldown() {
            self.ready_at.insert(kind, now + cooldown);
        }
    }

    fn reset_closing_streak(&mut self) {
        self.closing_ticks = 0;
        self.closing_total = 0.0;
    }

    // === Condition families ===

    fn check_session_boundaries(&mut self, s: &CompetitorState, now: Instant, batch: &mut Batch) {
        if !self.session_start_fired && s.current_lap <= 1 {
            self.session_start_fired = true;
            batch.push(TriggerKind::SessionStart, EventContext::new());
        }

        if s.session_kind == SessionKind::Qualifying
            && s.current_lap > 1
            && self
                .last_fired_lap
                .get(&TriggerKind::QualiLapStart)
                .map_or(true, |lap| *lap < s.current_lap)
            && self.ready(TriggerKind::QualiLapStart, now)
        {
            self.arm(TriggerKind::QualiLapStart, now);
            self.last_fired_lap
                .insert(TriggerKind::QualiLapStart, s.current_lap);
            batch.push(TriggerKind::QualiLapStart, EventContext::new());
        }

        if s.is_final_lap() && !self.final_lap_fired {
            self.final_lap_fired = true;
            batch.push(TriggerKind::FinalLap, EventContext::new());
        }

        if s.session_finished && !self.race_finished_fired {
            self.race_finished_fired = true;
            batch.push(TriggerKind::RaceFinished, EventContext::new());
        }
    }

    fn check_tyres(&mut self, s: &CompetitorState, projected: f32, now: Instant, batch: &mut Batch) {
        let max_wear = s.max_tyre_wear();
        let critical_at = critical_wear_threshold(s.total_laps);

        if (projected >= CRITICAL_PROJECTED_WEAR || max_wear >= critical_at)
            && self.ready(TriggerKind::CriticalTyres, now)
        {
            self.arm(TriggerKind::CriticalTyres, now);
            batch.push(
                TriggerKind::CriticalTyres,
                facts(json!({ "critical_threshold": round2(critical_at) })),
            );
        } else if projected >= WARNING_PROJECTED_WEAR
            && max_wear - self.last_tyre_alert_wear >= WEAR_GROWTH_FOR_REWARN
            && self.ready(TriggerKind::TyreWarning, now)
        {
            self.arm(TriggerKind::TyreWarning, now);
            self.last_tyre_alert_wear = max_wear;
            batch.push(TriggerKind::TyreWarning, EventContext::new());
        }

        let temps = s.tyre_inner_temp_c;
        if temps.values().iter().any(|t| *t > 0.0) {
            let average = temps.average();
            let corners = [
                ("rear left", temps.rear_left),
                ("rear right", temps.rear_right),
                ("front left", temps.front_left),
                ("front right", temps.front_right),
            ];
            let (hot_corner, hottest) = corners
                .into_iter()
                .fold(("", f32::MIN), |acc, c| if c.1 > acc.1 { c } else { acc });
            if hottest - average > TEMP_IMBALANCE_C
                && self.ready(TriggerKind::TyreTempImbalance, now)
            {
                self.arm(TriggerKind::TyreTempImbalance, now);
                batch.push(
                    TriggerKind::TyreTempImbalance,
                    facts(json!({
                        "hot_corner": hot_corner,
                        "imbalance_c": round2(hottest - average),
                    })),
                );
            }
        }
    }

    fn check_fuel(&mut self, s: &CompetitorState, now: Instant, batch: &mut Batch) {
        // No car-status data yet
        if s.fuel_mass_kg <= 0.0 {
            return;
        }
        let laps = s.fuel_remaining_laps;

        if laps < CRITICAL_FUEL_LAPS && self.ready(TriggerKind::CriticalFuel, now) {
            self.arm(TriggerKind::CriticalFuel, now);
            self.last_fuel_alert_laps = Some(laps);
            batch.push(TriggerKind::CriticalFuel, EventContext::new());
        } else if laps < LOW_FUEL_LAPS
            && self
                .last_fuel_alert_laps
                .map_or(true, |last| last - laps >= FUEL_DROP_FOR_REWARN)
            && self.ready(TriggerKind::FuelLow, now)
        {
            self.arm(TriggerKind::FuelLow, now);
            self.last_fuel_alert_laps = Some(laps);
            batch.push(TriggerKind::FuelLow, EventContext::new());
        }
    }

    fn check_defend(&mut self, s: &CompetitorState, now: Instant, batch: &mut Batch) {
        let gap = s.gap_behind_s;
        if gap > 0.0 && gap < DEFEND_GAP_S {
            if gap < self.last_defend_gap - DEFEND_SHRINK_S && self.ready(TriggerKind::Defend, now) {
                self.arm(TriggerKind::Defend, now);
                batch.push(TriggerKind::Defend, EventContext::new());
            }
            self.last_defend_gap = gap;
        } else {
            self.last_defend_gap = FAR_GAP_S;
        }
    }

    fn check_position_and_gaps(&mut self, s: &CompetitorState, now: Instant, batch: &mut Batch) {
        let gap = s.gap_ahead_s;
        let has_car_ahead = s.position > 1 && gap > 0.0;

        // Trend decays towards zero while there is nothing to chase
        let gain = match self.last_tick_gap_ahead {
            Some(prev_gap) if has_car_ahead => prev_gap - gap,
            _ => 0.0,
        };
        self.gap_trend = GAP_TREND_ALPHA * gain + (1.0 - GAP_TREND_ALPHA) * self.gap_trend;

        if s.position == 0 {
            self.last_tick_gap_ahead = None;
            self.reset_closing_streak();
            return;
        }

        if let Some(prev) = self.last_tick_position.filter(|p| *p > 0) {
            if s.position < prev && self.ready(TriggerKind::PositionGained, now) {
                self.arm(TriggerKind::PositionGained, now);
                batch.push(
                    TriggerKind::PositionGained,
                    facts(json!({ "previous_position": prev, "places": prev - s.position })),
                );
            } else if s.position > prev && self.ready(TriggerKind::PositionLost, now) {
                self.arm(TriggerKind::PositionLost, now);
                batch.push(
                    TriggerKind::PositionLost,
                    facts(json!({ "previous_position": prev, "places": s.position - prev })),
                );
            }
        }
        self.last_tick_position = Some(s.position);

        if !has_car_ahead {
            self.last_tick_gap_ahead = None;
            self.reset_closing_streak();
            return;
        }

        if let Some(prev_gap) = self.last_tick_gap_ahead {
            let delta = prev_gap - gap;
            if delta > GAP_CLOSE_AHEAD_S {
                self.reset_closing_streak();
                if self.ready(TriggerKind::GapCloseAhead, now) {
                    self.arm(TriggerKind::GapCloseAhead, now);
                    batch.push(
                        TriggerKind::GapCloseAhead,
                        facts(json!({ "gap_delta": round2(delta) })),
                    );
                }
            } else if delta > 0.0 {
                self.closing_ticks = self.closing_ticks.saturating_add(1);
                self.closing_total += delta;
                if self.closing_ticks >= GAP_CLOSING_TICKS && self.closing_total > GAP_CLOSE_AHEAD_S {
                    let closed = self.closing_total;
                    self.reset_closing_streak();
                    if self.ready(TriggerKind::GapClosing, now) {
                        self.arm(TriggerKind::GapClosing, now);
                        batch.push(
                            TriggerKind::GapClosing,
                            facts(json!({ "gap_delta": round2(closed) })),
                        );
                    }
                }
            } else {
                self.reset_closing_streak();
            }
        }
        self.last_tick_gap_ahead = Some(gap);
    }

    fn check_race_control(&mut self, s: &CompetitorState, now: Instant, batch: &mut Batch) {
        let sc = s.safety_car_status;
        if let Some(last) = self.last_safety_car.filter(|last| *last != sc) {
            let kind = match (last, sc) {
                (_, 1) => Some(TriggerKind::SafetyCarDeployed),
                (_, 2) => Some(TriggerKind::VscDeployed),
                (1, 0) => Some(TriggerKind::SafetyCarEnding),
                (2, 0) => Some(TriggerKind::VscEnding),
                _ => None,
            };
            if let Some(kind) = kind {
                batch.push(kind, EventContext::new());
            }
        }
        self.last_safety_car = Some(sc);

        let flag = s.fia_flag;
        if flag < 0 {
            return;
        }
        if self.last_fia_flag.is_some_and(|last| last != flag) {
            match flag {
                4 => batch.push(TriggerKind::RedFlag, EventContext::new()),
                3 if self.ready(TriggerKind::YellowFlag, now) => {
                    self.arm(TriggerKind::YellowFlag, now);
                    batch.push(
                        TriggerKind::YellowFlag,
                        facts(json!({ "yellow_sector_text": sector_text(s.yellow_sector) })),
                    );
                }
                2 if self.ready(TriggerKind::BlueFlag, now) => {
                    self.arm(TriggerKind::BlueFlag, now);
                    batch.push(TriggerKind::BlueFlag, EventContext::new());
                }
                _ => {}
            }
        }
        self.last_fia_flag = Some(flag);
    }

    fn check_penalty(&mut self, s: &CompetitorState, now: Instant, batch: &mut Batch) {
        let penalty = s.penalty_seconds;
        if penalty > self.last_penalty {
            // A pre-existing penalty read on cold start is not news unless big
            let first_read = !self.penalty_seen;
            if (!first_read || penalty >= PENALTY_COLD_START_S)
                && self.ready(TriggerKind::Penalty, now)
            {
                self.arm(TriggerKind::Penalty, now);
                batch.push(
                    TriggerKind::Penalty,
                    facts(json!({
                        "penalty_added": penalty - self.last_penalty,
                        "drive_throughs": s.unserved_drive_through,
                        "stop_gos": s.unserved_stop_go,
                    })),
                );
            }
            self.last_penalty = penalty;
            self.penalty_seen = true;
        } else if penalty < self.last_penalty {
            self.last_penalty = penalty;
        }
    }

    fn check_damage(&mut self, s: &CompetitorState, batch: &mut Batch) {
        for component in DamageComponent::ALL {
            let level = s.damage.get(component);
            if level >= DAMAGE_ALERT && self.fired_damage.insert(component) {
                batch.push(
                    TriggerKind::Damage,
                    facts(json!({
                        "component": component.name().replace('_', " "),
                        "level": round2(level),
                    })),
                );
            }
        }
    }

    fn check_weather(&mut self, s: &CompetitorState, now: Instant, batch: &mut Batch) {
        if s.approaching_rain() && self.ready(TriggerKind::WeatherIncoming, now) {
            self.arm(TriggerKind::WeatherIncoming, now);
            let minutes = s
                .forecast
                .iter()
                .filter(|f| f.is_wet())
                .map(|f| f.time_offset_min)
                .min()
                .unwrap_or(0);
            batch.push(
                TriggerKind::WeatherIncoming,
                facts(json!({ "minutes_to_rain": minutes })),
            );
        }

        if s.is_wet() && self.ready(TriggerKind::RainStarts, now) {
            self.arm(TriggerKind::RainStarts, now);
            batch.push(TriggerKind::RainStarts, EventContext::new());
        }
    }

    fn check_pit_strategy(&mut self, s: &CompetitorState, projected: f32, now: Instant, batch: &mut Batch) {
        if !s.session_kind.is_race_like() || s.total_laps == 0 {
            return;
        }
        let total = f32::from(s.total_laps);
        let progress = f32::from(s.current_lap) / total;
        let max_wear = s.max_tyre_wear();

        let concern = pit_window_threshold(total);
        if projected >= concern
            && progress > 0.25
            && progress < 0.70
            && self.ready(TriggerKind::PitWindowOptimal, now)
        {
            self.arm(TriggerKind::PitWindowOptimal, now);
            batch.push(
                TriggerKind::PitWindowOptimal,
                facts(json!({ "concern_threshold": round2(concern) })),
            );
        }

        let gap_behind = s.gap_behind_s;
        if gap_behind > 0.0
            && gap_behind < UNDERCUT_GAP_S
            && max_wear > undercut_min_wear(total)
            && self.ready(TriggerKind::UndercutOpportunity, now)
        {
            self.arm(TriggerKind::UndercutOpportunity, now);
            batch.push(TriggerKind::UndercutOpportunity, EventContext::new());
        }

        let gap_ahead = s.gap_ahead_s;
        if s.position > 1
            && gap_ahead > 0.0
            && gap_ahead < OVERCUT_GAP_S
            && max_wear < overcut_max_wear(total)
            && self.ready(TriggerKind::OvercutOpportunity, now)
        {
            self.arm(TriggerKind::OvercutOpportunity, now);
            batch.push(TriggerKind::OvercutOpportunity, EventContext::new());
        }
    }

    fn check_car_ahead(
        &mut self,
        s: &CompetitorState,
        field: &[CarSnapshot],
        now: Instant,
        batch: &mut Batch,
    ) {
        if s.position <= 1 {
            return;
        }
        let Some(ahead) = find_by_position(field, s.position - 1) else {
            return;
        };

        if s.gap_ahead_s > 0.0 && s.gap_ahead_s < NEARBY_GAP_S {
            let key = ahead.position;
            if ahead.max_damage >= NEARBY_DAMAGE_ALERT {
                if !self.alerted_cars_ahead.contains(&key)
                    && self.ready(TriggerKind::NearbyCarDamage, now)
                {
                    self.arm(TriggerKind::NearbyCarDamage, now);
                    self.alerted_cars_ahead.insert(key);
                    batch.push(
                        TriggerKind::NearbyCarDamage,
                        facts(json!({
                            "ahead_damage_pct": round2(ahead.max_damage),
                            "ahead_gap_s": round2(s.gap_ahead_s),
                        })),
                    );
                }
            } else if ahead.max_damage < NEARBY_DAMAGE_CLEAR {
                self.alerted_cars_ahead.remove(&key);
            }
        }

        if s.gap_ahead_s < RIVAL_PIT_GAP_S {
            if ahead.in_pit() {
                if self.last_rival_pit_position != ahead.position
                    && self.ready(TriggerKind::RivalPitted, now)
                {
                    self.arm(TriggerKind::RivalPitted, now);
                    self.last_rival_pit_position = ahead.position;
                    batch.push(
                        TriggerKind::RivalPitted,
                        facts(json!({ "rival_position": ahead.position })),
                    );
                }
            } else if ahead.pit_status == 0 {
                self.last_rival_pit_position = 0;
            }
        }
    }

    fn check_personal_bests(&mut self, s: &CompetitorState, now: Instant, batch: &mut Batch) {
        if s.session_kind.is_qualifying() && s.current_lap > 1 {
            let top = s.max_speed_this_lap_kph;
            if top > SPEED_TRAP_FLOOR_KPH {
                if top > self.best_speed_kph.saturating_add(SPEED_TRAP_MARGIN_KPH)
                    && self.ready(TriggerKind::SpeedTrap, now)
                {
                    self.arm(TriggerKind::SpeedTrap, now);
                    batch.push(
                        TriggerKind::SpeedTrap,
                        facts(json!({
                            "top_speed_kph": top,
                            "previous_best_kph": self.best_speed_kph,
                        })),
                    );
                }
                self.best_speed_kph = self.best_speed_kph.max(top);
            }
        }

        let best = s.best_lap_time_ms;
        if best > 0 {
            if self.last_best_lap_ms > 0 && best < self.last_best_lap_ms {
                batch.push(
                    TriggerKind::PersonalBest,
                    facts(json!({
                        "new_best_ms": best,
                        "prev_best_ms": self.last_best_lap_ms,
                        "improvement_ms": self.last_best_lap_ms - best,
                    })),
                );
            }
            self.last_best_lap_ms = best;
        }
    }
}

/// Candidates collected during one tick for one competitor
struct Batch {
    session: SessionKind,
    in_grace: bool,
    candidates: Vec<(TriggerKind, EventContext)>,
}

impl Batch {
    fn push(&mut self, kind: TriggerKind, extras: EventContext) {
        if !kind.allowed_in(self.session) {
            debug!("{} suppressed in {}", kind.name(), self.session.display_name());
            return;
        }
        if self.in_grace && !kind.allowed_during_grace() {
            debug!("{} suppressed during startup grace", kind.name());
            return;
        }
        self.candidates.push((kind, extras));
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct TriggerEngine {
    config: EngineConfig,
    started_at: Instant,
    states: HashMap<u8, TriggerState>,
}

impl TriggerEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_start(config, Instant::now())
    }

    /// Engine whose grace period counts from `started_at`
    pub fn with_start(config: EngineConfig, started_at: Instant) -> Self {
        Self {
            config,
            started_at,
            states: HashMap::new(),
        }
    }

    pub fn state(&self, car_index: u8) -> Option<&TriggerState> {
        self.states.get(&car_index)
    }

    /// Evaluate one competitor for this tick.
    ///
    /// Returns at most `max_events_per_tick` events, most urgent first.
    pub fn evaluate(
        &mut self,
        state: &CompetitorState,
        field: &[CarSnapshot],
        now: Instant,
    ) -> Vec<AdvisoryEvent> {
        if state.session_kind == SessionKind::Unset {
            return Vec::new();
        }

        let in_grace = now.saturating_duration_since(self.started_at) < self.config.grace_period;
        let ts = self.states.entry(state.car_index).or_default();

        if ts.race_finished_fired {
            return Vec::new();
        }

        if state.session_kind == SessionKind::Unknown && !ts.unknown_session_warned {
            ts.unknown_session_warned = true;
            warn!(
                "Unknown session type {} for car {}, using practice triggers",
                state.session_type_raw, state.car_index
            );
        }

        let projected = project_wear(
            state.max_tyre_wear(),
            state.completed_laps(),
            state.total_laps,
        );

        let mut batch = Batch {
            session: state.session_kind,
            in_grace,
            candidates: Vec::new(),
        };

        ts.check_session_boundaries(state, now, &mut batch);
        ts.check_tyres(state, projected, now, &mut batch);
        ts.check_fuel(state, now, &mut batch);
        ts.check_defend(state, now, &mut batch);
        ts.check_position_and_gaps(state, now, &mut batch);
        ts.check_race_control(state, now, &mut batch);
        ts.check_penalty(state, now, &mut batch);
        ts.check_damage(state, &mut batch);
        ts.check_weather(state, now, &mut batch);
        ts.check_pit_strategy(state, projected, now, &mut batch);
        ts.check_car_ahead(state, field, now, &mut batch);
        ts.check_personal_bests(state, now, &mut batch);

        if batch.candidates.is_empty() {
            return Vec::new();
        }

        let mut candidates = batch.candidates;
        candidates.sort_by_key(|(kind, _)| kind.priority());
        candidates.truncate(self.config.max_events_per_tick);

        let base = base_context(state, field, ts.gap_trend, projected);
        candidates
            .into_iter()
            .map(|(kind, extras)| {
                let mut context = base.clone();
                context.extend(extras);
                AdvisoryEvent::new(kind, state.car_index, state.account_id.clone(), context)
            })
            .collect()
    }

    /// Terminal chequered-flag call, once per competitor per session.
    /// Driven by the event packet rather than the tick.
    pub fn on_chequered_flag(
        &mut self,
        state: &CompetitorState,
        field: &[CarSnapshot],
    ) -> Option<AdvisoryEvent> {
        let ts = self.states.entry(state.car_index).or_default();
        if ts.chequered_fired {
            return None;
        }
        ts.chequered_fired = true;

        let projected = project_wear(
            state.max_tyre_wear(),
            state.completed_laps(),
            state.total_laps,
        );
        let context = base_context(state, field, ts.gap_trend, projected);
        Some(AdvisoryEvent::new(
            TriggerKind::ChequeredFlag,
            state.car_index,
            state.account_id.clone(),
            context,
        ))
    }

    /// Drop everything remembered about a competitor (new session)
    pub fn reset_session(&mut self, car_index: u8) {
        self.states.insert(car_index, TriggerState::default());
    }

    /// Forget competitors no longer tracked
    pub fn retain(&mut self, tracked: &[u8]) {
        self.states.retain(|idx, _| tracked.contains(idx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_formula() {
        assert_eq!(project_wear(18.0, 2, 5), 45.0);
    }

    #[test]
    fn test_projection_needs_two_laps() {
        assert_eq!(project_wear(18.0, 1, 5), 18.0);
        assert_eq!(project_wear(18.0, 4, 0), 18.0);
    }

    #[test]
    fn test_projection_capped() {
        assert_eq!(project_wear(60.0, 2, 50), 100.0);
    }

    #[test]
    fn test_critical_threshold_clamped() {
        assert_eq!(critical_wear_threshold(5), 85.0);
        assert_eq!(critical_wear_threshold(50), 75.0);
        assert_eq!(critical_wear_threshold(100), 60.0);
    }

    #[test]
    fn test_length_scaled_thresholds() {
        assert_eq!(pit_window_threshold(5.0), 50.0);
        assert_eq!(pit_window_threshold(50.0), 35.0);
        assert_eq!(undercut_min_wear(10.0), 30.0);
        assert_eq!(overcut_max_wear(100.0), 40.0);
    }

    #[test]
    fn test_ready_for_transition_kinds_is_always_true() {
        let mut ts = TriggerState::default();
        let now = Instant::now();
        ts.arm(TriggerKind::RedFlag, now);
        assert!(ts.ready(TriggerKind::RedFlag, now));
        ts.arm(TriggerKind::Defend, now);
        assert!(!ts.ready(TriggerKind::Defend, now));
        assert!(ts.ready(TriggerKind::Defend, now + Duration::from_secs(60)));
    }
}
