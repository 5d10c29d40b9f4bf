//! Synthetic race feed for running without the game
//!
//! Simulates a short race at Silverstone: a 20-car field with staggered
//! pace, a player car that climbs through the order, a safety-car period, a
//! pit stop, a damaged rival and incoming rain. Every step is encoded as real
//! datagrams so the decoder, engine and delivery pipeline all run exactly as
//! they would against the game.

use crate::encode::StreamHeader;
use crate::packets::{
    DamageEntry, LapEntry, MarshalZone, SessionData, StatusEntry, TelemetryEntry,
};
use anyhow::{Context, Result};
use boxbox_core::model::{Corners, ForecastSample};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEMO_FORMAT: u16 = 2025;
const TRACK_ID: i8 = 7;
const TRACK_LENGTH_M: f32 = 5891.0;
const TOTAL_LAPS: u8 = 5;
/// Race, in the current session numbering
const SESSION_TYPE: u8 = 15;
const PLAYER: usize = 0;
const PLAYER_GRID_SLOT: usize = 8;
/// Car that picks up heavy damage mid-race
const DAMAGED_CAR: usize = 6;

const BASE_LAP_S: f32 = 88.0;
const SAFETY_CAR_WINDOW_S: (f32, f32) = (150.0, 185.0);
const PIT_STOP_S: f32 = 22.0;
const RAIN_FORECAST_AFTER_S: f32 = 90.0;
/// Time after the chequered flag before the session-end event
const COOL_DOWN_S: f32 = 20.0;

const STEP: Duration = Duration::from_millis(100);

const NAMES: [&str; 20] = [
    "PLAYER", "VERSTAPPEN", "NORRIS", "LECLERC", "PIASTRI", "SAINZ", "HAMILTON",
    "RUSSELL", "PEREZ", "ALONSO", "STROLL", "GASLY", "OCON", "ALBON", "TSUNODA",
    "HULKENBERG", "MAGNUSSEN", "BOTTAS", "ZHOU", "SARGEANT",
];

#[derive(Debug, Clone)]
struct DemoCar {
    grid_position: u8,
    pace_s: f32,
    distance_m: f32,
    pit_until_s: Option<f32>,
    stint_start_m: f32,
    pit_stops: u8,
}

impl DemoCar {
    fn lap(&self) -> u8 {
        let lap = (self.distance_m.max(0.0) / TRACK_LENGTH_M) as u8 + 1;
        lap.min(TOTAL_LAPS)
    }

    fn finished(&self) -> bool {
        self.distance_m >= TRACK_LENGTH_M * f32::from(TOTAL_LAPS)
    }

    fn lap_fraction(&self) -> f32 {
        (self.distance_m.max(0.0) % TRACK_LENGTH_M) / TRACK_LENGTH_M
    }

    fn speed_mps(&self) -> f32 {
        TRACK_LENGTH_M / self.pace_s
    }

    fn in_pit(&self, now: f32) -> bool {
        self.pit_until_s.is_some_and(|until| now < until)
    }

    /// Laps done on the current set of tyres
    fn stint_laps(&self) -> f32 {
        (self.distance_m - self.stint_start_m).max(0.0) / TRACK_LENGTH_M
    }
}

pub struct DemoRace {
    header: StreamHeader,
    cars: Vec<DemoCar>,
    elapsed_s: f32,
    steps: u64,
    chequered_at: Option<f32>,
    ended: bool,
}

impl DemoRace {
    pub fn new(session_uid: u64) -> Self {
        let mut grid: Vec<usize> = (1..NAMES.len()).collect();
        grid.insert(PLAYER_GRID_SLOT - 1, PLAYER);

        let mut cars = vec![
            DemoCar {
                grid_position: 0,
                pace_s: 0.0,
                distance_m: 0.0,
                pit_until_s: None,
                stint_start_m: 0.0,
                pit_stops: 0,
            };
            NAMES.len()
        ];
        for (slot, car_idx) in grid.into_iter().enumerate() {
            let car = &mut cars[car_idx];
            car.grid_position = slot as u8 + 1;
            car.pace_s = BASE_LAP_S + slot as f32 * 0.12;
            // Staggered grid behind the line
            car.distance_m = -(slot as f32) * 8.0;
        }
        cars[PLAYER].pace_s = BASE_LAP_S + 0.3;

        Self {
            header: StreamHeader::new(DEMO_FORMAT, session_uid, PLAYER as u8),
            cars,
            elapsed_s: 0.0,
            steps: 0,
            chequered_at: None,
            ended: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended
    }

    fn safety_car(&self) -> u8 {
        let (from, to) = SAFETY_CAR_WINDOW_S;
        u8::from(self.elapsed_s >= from && self.elapsed_s < to)
    }

    /// Car indices in running order
    fn order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.cars.len()).collect();
        order.sort_by(|a, b| self.cars[*b].distance_m.total_cmp(&self.cars[*a].distance_m));
        order
    }

    /// Advance the simulation by `dt` seconds and encode the datagrams for
    /// the new state.
    pub fn step(&mut self, dt: f32) -> Vec<Vec<u8>> {
        if self.ended {
            return Vec::new();
        }
        self.elapsed_s += dt;
        self.steps += 1;
        self.header.session_time = self.elapsed_s;
        self.header.frame_identifier = self.steps as u32;

        let now = self.elapsed_s;
        let pace_factor = if self.safety_car() == 1 { 0.6 } else { 1.0 };
        for (idx, car) in self.cars.iter_mut().enumerate() {
            if car.finished() {
                continue;
            }
            // Player stops at the start of lap 3
            if idx == PLAYER && car.pit_stops == 0 && car.lap() == 3 {
                car.pit_until_s = Some(now + PIT_STOP_S);
                car.pit_stops = 1;
                car.stint_start_m = car.distance_m;
            }
            let factor = if car.in_pit(now) { 0.3 } else { pace_factor };
            car.distance_m += car.speed_mps() * factor * dt;
        }

        let mut datagrams = Vec::new();
        if self.steps == 1 {
            datagrams.push(self.header.event("SSTA"));
        }
        if self.steps % 10 == 1 {
            datagrams.push(self.header.session(&self.session_data()));
        }
        if self.steps % 25 == 1 {
            datagrams.push(self.header.participants(NAMES.len() as u8, &NAMES));
        }
        datagrams.push(self.header.lap_data(&self.lap_entries()));
        datagrams.push(self.header.car_telemetry(&self.telemetry_entries()));
        datagrams.push(self.header.car_status(&self.status_entries()));
        if self.steps % 5 == 1 {
            datagrams.push(self.header.car_damage(&self.damage_entries()));
        }

        let leader_done = self.order().first().is_some_and(|idx| self.cars[*idx].finished());
        match self.chequered_at {
            None if leader_done => {
                self.chequered_at = Some(now);
                datagrams.push(self.header.event("CHQF"));
            }
            Some(at) if now - at > COOL_DOWN_S || self.cars.iter().all(DemoCar::finished) => {
                self.ended = true;
                datagrams.push(self.header.event("SEND"));
            }
            _ => {}
        }
        datagrams
    }

    fn session_data(&self) -> SessionData {
        let mut forecast = vec![ForecastSample {
            session_type: SESSION_TYPE,
            time_offset_min: 0,
            weather: 1,
            rain_percentage: 10,
        }];
        if self.elapsed_s > RAIN_FORECAST_AFTER_S {
            forecast.push(ForecastSample {
                session_type: SESSION_TYPE,
                time_offset_min: 10,
                weather: 3,
                rain_percentage: 65,
            });
        }
        // Waved yellows in sector two while the safety car is out
        let yellow = if self.safety_car() == 1 { 3 } else { 1 };

        SessionData {
            weather: 1,
            track_temp_c: 31,
            air_temp_c: 22,
            total_laps: TOTAL_LAPS,
            track_length_m: TRACK_LENGTH_M as u16,
            session_type: SESSION_TYPE,
            track_id: TRACK_ID,
            safety_car_status: self.safety_car(),
            marshal_zones: vec![
                MarshalZone { zone_start: 0.05, flag: 1 },
                MarshalZone { zone_start: 0.45, flag: yellow },
                MarshalZone { zone_start: 0.80, flag: 1 },
            ],
            forecast,
        }
    }

    fn lap_entries(&self) -> Vec<LapEntry> {
        let now = self.elapsed_s;
        let order = self.order();
        let leader = &self.cars[order[0]];
        let mut entries = vec![LapEntry::default(); self.cars.len()];

        for (rank, idx) in order.iter().enumerate() {
            let car = &self.cars[*idx];
            let speed = car.speed_mps();
            let gap_ahead_s = match rank {
                0 => 0.0,
                _ => (self.cars[order[rank - 1]].distance_m - car.distance_m) / speed,
            };
            let gap_leader_s = (leader.distance_m - car.distance_m) / speed;
            let frac = car.lap_fraction();
            let sector = if frac < 0.3 { 1 } else if frac < 0.68 { 2 } else { 3 };
            let lap_ms = (car.pace_s * 1000.0) as u32;

            entries[*idx] = LapEntry {
                last_lap_time_ms: if car.lap() > 1 { lap_ms } else { 0 },
                current_lap_time_ms: (frac * car.pace_s * 1000.0) as u32,
                sector1_ms: if sector > 1 { lap_ms * 30 / 100 } else { 0 },
                sector2_ms: if sector > 2 { lap_ms * 38 / 100 } else { 0 },
                delta_to_car_in_front_ms: (gap_ahead_s.max(0.0) * 1000.0) as u32,
                delta_to_leader_ms: (gap_leader_s.max(0.0) * 1000.0) as u32,
                lap_distance_m: frac * TRACK_LENGTH_M,
                position: rank as u8 + 1,
                current_lap: car.lap(),
                pit_status: u8::from(car.in_pit(now)),
                num_pit_stops: car.pit_stops,
                sector,
                grid_position: car.grid_position,
                driver_status: if car.in_pit(now) { 0 } else { 4 },
                ..Default::default()
            };
        }
        entries
    }

    fn telemetry_entries(&self) -> Vec<TelemetryEntry> {
        let now = self.elapsed_s;
        self.cars
            .iter()
            .map(|car| {
                // Fast on the straights, slow through the complex
                let frac = car.lap_fraction();
                let wave = (frac * std::f32::consts::TAU * 4.0).sin();
                let speed = if car.in_pit(now) { 80.0 } else { 230.0 + 80.0 * wave };
                let base_temp = 95.0 + 4.0 * wave;
                TelemetryEntry {
                    speed_kph: speed as u16,
                    drs_open: wave > 0.8,
                    inner_temp_c: Corners::from_wire([base_temp, base_temp, base_temp + 3.0, base_temp + 2.0]),
                }
            })
            .collect()
    }

    fn status_entries(&self) -> Vec<StatusEntry> {
        self.cars
            .iter()
            .map(|car| {
                let laps_done = car.distance_m.max(0.0) / TRACK_LENGTH_M;
                let fuel_laps = (5.8 - laps_done * 1.2).max(0.0);
                StatusEntry {
                    fuel_mix: 1,
                    fuel_mass_kg: fuel_laps * 1.6,
                    fuel_remaining_laps: fuel_laps,
                    drs_allowed: car.lap() > 2,
                    visual_compound: if car.pit_stops > 0 { 18 } else { 17 },
                    tyre_age_laps: car.stint_laps() as u8,
                    fia_flag: if self.safety_car() == 1 { 3 } else { 1 },
                    ers_store_j: 2_500_000.0 + 1_000_000.0 * (laps_done * 2.0).sin(),
                    ers_deploy_mode: 1,
                }
            })
            .collect()
    }

    fn damage_entries(&self) -> Vec<DamageEntry> {
        let now = self.elapsed_s;
        self.cars
            .iter()
            .enumerate()
            .map(|(idx, car)| {
                // Scrubbed-in sets start above 1% so the wire never looks fractional
                let wear = (2.0 + car.stint_laps() * 14.0).min(100.0);
                let damaged = idx == DAMAGED_CAR && now > 200.0;
                DamageEntry {
                    tyre_wear: Corners::from_wire([wear * 0.8, wear * 0.85, wear, wear * 0.95]),
                    front_left_wing: if damaged { 45 } else { 0 },
                    floor: if damaged { 25 } else { 0 },
                    ..Default::default()
                }
            })
            .collect()
    }
}

/// Send synthetic races to `target` until shutdown, starting a fresh session
/// after each one ends.
pub async fn run(target: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Failed to bind demo feed socket")?;
    let mut ticker = tokio::time::interval(STEP);
    let mut session_uid = 0xB0B0_0000_0000_0001u64;

    info!("Demo feed sending to {}", target);
    loop {
        let mut race = DemoRace::new(session_uid);
        while !race.is_finished() {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            for datagram in race.step(STEP.as_secs_f32()) {
                socket.send_to(&datagram, target).await?;
            }
        }
        info!("Demo race finished, restarting shortly");
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(Duration::from_secs(10)) => {}
        }
        session_uid += 1;
    }
}
