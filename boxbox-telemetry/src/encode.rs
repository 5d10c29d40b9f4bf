//! Datagram encoder, the inverse of the decoder's field layouts
//!
//! Used by the demo feed and by tests to build realistic datagrams for any
//! supported packet format.

use crate::header::{PacketId, HEADER_SIZE, NO_CAR};
use crate::layout::{put, ProtocolLayout};
use crate::packets::{DamageEntry, LapEntry, SessionData, StatusEntry, TelemetryEntry};

/// Header fields shared by every datagram of a stream
#[derive(Debug, Clone, Copy)]
pub struct StreamHeader {
    pub packet_format: u16,
    pub session_uid: u64,
    pub session_time: f32,
    pub frame_identifier: u32,
    pub player_car_index: u8,
    pub secondary_player_car_index: u8,
}

impl StreamHeader {
    pub fn new(packet_format: u16, session_uid: u64, player_car_index: u8) -> Self {
        Self {
            packet_format,
            session_uid,
            session_time: 0.0,
            frame_identifier: 0,
            player_car_index,
            secondary_player_car_index: NO_CAR,
        }
    }

    fn layout(&self) -> &'static ProtocolLayout {
        ProtocolLayout::for_format(self.packet_format)
    }

    fn write(&self, id: PacketId, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&self.packet_format.to_le_bytes());
        buf.push((self.packet_format % 100) as u8);
        buf.push(1);
        buf.push(0);
        buf.push(1);
        buf.push(id.wire_id());
        buf.extend_from_slice(&self.session_uid.to_le_bytes());
        buf.extend_from_slice(&self.session_time.to_le_bytes());
        buf.extend_from_slice(&self.frame_identifier.to_le_bytes());
        buf.extend_from_slice(&self.frame_identifier.to_le_bytes());
        buf.push(self.player_car_index);
        buf.push(self.secondary_player_car_index);
        buf.extend_from_slice(payload);
        buf
    }

    pub fn session(&self, s: &SessionData) -> Vec<u8> {
        let l = &self.layout().session;
        let mut p = vec![0u8; l.forecast_samples + l.max_forecast_samples * l.forecast_sample_size];
        put(&mut p, l.weather, &[s.weather]);
        put(&mut p, l.track_temp, &s.track_temp_c.to_le_bytes());
        put(&mut p, l.air_temp, &s.air_temp_c.to_le_bytes());
        put(&mut p, l.total_laps, &[s.total_laps]);
        put(&mut p, l.track_length, &s.track_length_m.to_le_bytes());
        put(&mut p, l.session_type, &[s.session_type]);
        put(&mut p, l.track_id, &s.track_id.to_le_bytes());

        let zones = s.marshal_zones.len().min(l.max_marshal_zones);
        put(&mut p, l.num_marshal_zones, &[zones as u8]);
        for (i, zone) in s.marshal_zones.iter().take(zones).enumerate() {
            let at = l.marshal_zones + i * l.marshal_zone_size;
            put(&mut p, at, &zone.zone_start.to_le_bytes());
            put(&mut p, at + 4, &zone.flag.to_le_bytes());
        }

        put(&mut p, l.safety_car_status, &[s.safety_car_status]);

        let samples = s.forecast.len().min(l.max_forecast_samples);
        put(&mut p, l.num_forecast_samples, &[samples as u8]);
        for (i, f) in s.forecast.iter().take(samples).enumerate() {
            let at = l.forecast_samples + i * l.forecast_sample_size;
            put(&mut p, at, &[f.session_type, f.time_offset_min, f.weather]);
            put(&mut p, at + 7, &[f.rain_percentage]);
        }
        self.write(PacketId::Session, &p)
    }

    pub fn lap_data(&self, entries: &[LapEntry]) -> Vec<u8> {
        let l = &self.layout().lap;
        let p = per_car(entries, 0, l.entry_size, |e, entry| {
            put(entry, l.last_lap_ms, &e.last_lap_time_ms.to_le_bytes());
            put(entry, l.current_lap_ms, &e.current_lap_time_ms.to_le_bytes());
            l.sector1.write(entry, e.sector1_ms);
            l.sector2.write(entry, e.sector2_ms);
            l.delta_to_car_in_front.write(entry, e.delta_to_car_in_front_ms);
            l.delta_to_leader.write(entry, e.delta_to_leader_ms);
            put(entry, l.lap_distance, &e.lap_distance_m.to_le_bytes());
            put(entry, l.car_position, &[e.position]);
            put(entry, l.current_lap_num, &[e.current_lap]);
            put(entry, l.pit_status, &[e.pit_status]);
            put(entry, l.num_pit_stops, &[e.num_pit_stops]);
            put(entry, l.sector, &[e.sector.saturating_sub(1)]);
            put(entry, l.lap_invalid, &[u8::from(e.lap_invalid)]);
            put(entry, l.penalties, &[e.penalty_seconds]);
            put(entry, l.warnings, &[e.warnings]);
            put(entry, l.unserved_drive_through, &[e.unserved_drive_through]);
            put(entry, l.unserved_stop_go, &[e.unserved_stop_go]);
            put(entry, l.grid_position, &[e.grid_position]);
            put(entry, l.driver_status, &[e.driver_status]);
        });
        self.write(PacketId::LapData, &p)
    }

    pub fn car_telemetry(&self, entries: &[TelemetryEntry]) -> Vec<u8> {
        let t = &self.layout().telemetry;
        let p = per_car(entries, 0, t.entry_size, |e, entry| {
            put(entry, t.speed, &e.speed_kph.to_le_bytes());
            put(entry, t.drs, &[u8::from(e.drs_open)]);
            let temps = e.inner_temp_c.values().map(|v| v.clamp(0.0, 255.0) as u8);
            put(entry, t.inner_temps, &temps);
        });
        self.write(PacketId::CarTelemetry, &p)
    }

    pub fn car_status(&self, entries: &[StatusEntry]) -> Vec<u8> {
        let s = &self.layout().status;
        let p = per_car(entries, 0, s.entry_size, |e, entry| {
            put(entry, s.fuel_mix, &[e.fuel_mix]);
            put(entry, s.fuel_in_tank, &e.fuel_mass_kg.to_le_bytes());
            put(entry, s.fuel_remaining_laps, &e.fuel_remaining_laps.to_le_bytes());
            put(entry, s.drs_allowed, &[u8::from(e.drs_allowed)]);
            put(entry, s.visual_compound, &[e.visual_compound]);
            put(entry, s.tyre_age_laps, &[e.tyre_age_laps]);
            put(entry, s.fia_flags, &e.fia_flag.to_le_bytes());
            put(entry, s.ers_store, &e.ers_store_j.to_le_bytes());
            put(entry, s.ers_deploy_mode, &[e.ers_deploy_mode]);
        });
        self.write(PacketId::CarStatus, &p)
    }

    pub fn car_damage(&self, entries: &[DamageEntry]) -> Vec<u8> {
        let d = &self.layout().damage;
        let p = per_car(entries, 0, d.entry_size, |e, entry| {
            for (i, wear) in e.tyre_wear.values().iter().enumerate() {
                put(entry, d.tyre_wear + i * 4, &wear.to_le_bytes());
            }
            put(
                entry,
                d.wings,
                &[
                    e.front_left_wing,
                    e.front_right_wing,
                    e.rear_wing,
                    e.floor,
                    e.diffuser,
                    e.sidepod,
                ],
            );
        });
        self.write(PacketId::CarDamage, &p)
    }

    pub fn participants(&self, num_active_cars: u8, names: &[&str]) -> Vec<u8> {
        let l = &self.layout().participant;
        let mut p = per_car(names, 1, l.entry_size, |name, entry| {
            let bytes = name.as_bytes();
            // Keep room for the terminating NUL
            let len = bytes.len().min(l.name_len - 1);
            put(entry, l.name, &bytes[..len]);
        });
        put(&mut p, 0, &[num_active_cars]);
        self.write(PacketId::Participants, &p)
    }

    pub fn event(&self, code: &str) -> Vec<u8> {
        let mut p = [0u8; 16];
        put(&mut p, 0, &code.as_bytes()[..code.len().min(4)]);
        self.write(PacketId::Event, &p)
    }
}

/// Payload with a full 22-slot table of entries after `start` bytes.
/// Slots past `items.len()` stay zeroed.
fn per_car<T>(
    items: &[T],
    start: usize,
    entry_size: usize,
    mut fill: impl FnMut(&T, &mut [u8]),
) -> Vec<u8> {
    let mut payload = vec![0u8; start + boxbox_core::model::NUM_CARS * entry_size];
    for (idx, item) in items.iter().take(boxbox_core::model::NUM_CARS).enumerate() {
        let at = start + idx * entry_size;
        fill(item, &mut payload[at..at + entry_size]);
    }
    payload
}
