//! Applies decoded packets to the telemetry store
//!
//! The decoder is the store's only writer. It resolves which car slots are
//! tracked from the first valid header of each session, then folds every
//! packet into the tracked competitors and the per-slot field snapshots.

use crate::header::{DecodeError, PacketHeader, PacketId};
use crate::packets::{
    DamageEntry, LapEntry, Packet, Participants, SessionData, StatusEntry, TelemetryEntry,
};
use boxbox_core::model::{CompetitorState, ERS_STORE_CAPACITY_J};
use boxbox_core::session::{session_kind_from_raw, SessionNumbering};
use boxbox_core::store::TelemetryStore;
use std::time::Instant;
use tracing::{debug, info};

/// Session lifecycle signals raised while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// A new session UID was seen and the store was reset
    Changed { session_uid: u64 },
    /// Chequered flag or session-end event
    Ended { code: String },
}

/// What one datagram did to the store. Both fields are `None` when the
/// datagram was dropped while waiting for a valid player slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOutcome {
    pub packet: Option<PacketId>,
    pub signal: Option<SessionSignal>,
}

#[derive(Debug, Clone, Default)]
pub struct PacketDecoder {
    numbering: SessionNumbering,
    /// External account ids for the player and secondary player slots
    player_accounts: Vec<String>,
}

impl PacketDecoder {
    pub fn new(numbering: SessionNumbering, player_accounts: Vec<String>) -> Self {
        Self {
            numbering,
            player_accounts,
        }
    }

    /// Decode one datagram and fold it into `store`.
    ///
    /// Every call records packet arrival, even when the datagram turns out
    /// to be malformed or of a kind the decoder ignores.
    pub fn apply(
        &self,
        store: &mut TelemetryStore,
        datagram: &[u8],
        now: Instant,
    ) -> Result<DecodeOutcome, DecodeError> {
        store.mark_packet(now);
        let header = PacketHeader::parse(datagram)?;

        let new_session = store.session_uid() != Some(header.session_uid);
        if new_session {
            let Some(player) = header.player_slot() else {
                return Ok(DecodeOutcome::default());
            };
            self.begin_session(store, &header, player);
        }
        let changed = new_session.then_some(SessionSignal::Changed {
            session_uid: header.session_uid,
        });

        let packet = match Packet::decode(&header, datagram) {
            Ok(packet) => packet,
            // The store was already reset, so the signal must still go out
            Err(err) if changed.is_some() => {
                debug!("Session change on undecoded packet: {}", err);
                return Ok(DecodeOutcome {
                    packet: None,
                    signal: changed,
                });
            }
            Err(err) => return Err(err),
        };

        let id = packet.id();
        let ended = match packet {
            Packet::Session(data) => {
                self.apply_session(store, &data, header.packet_format);
                None
            }
            Packet::LapData(entries) => {
                apply_lap_data(store, &entries);
                None
            }
            Packet::CarTelemetry(entries) => {
                apply_car_telemetry(store, &entries);
                None
            }
            Packet::CarStatus(entries) => {
                apply_car_status(store, &entries);
                None
            }
            Packet::CarDamage(entries) => {
                apply_car_damage(store, &entries);
                None
            }
            Packet::Participants(participants) => {
                apply_participants(store, &participants);
                None
            }
            Packet::Event(code) => apply_event(store, code),
        };

        Ok(DecodeOutcome {
            packet: Some(id),
            signal: changed.or(ended),
        })
    }

    fn begin_session(&self, store: &mut TelemetryStore, header: &PacketHeader, player: u8) {
        store.begin_session(header.session_uid, header.packet_format);

        let primary = store.get_or_create(player);
        primary.account_id = self.player_accounts.first().cloned();

        let secondary = header.secondary_slot().filter(|idx| *idx != player);
        if let Some(idx) = secondary {
            let competitor = store.get_or_create(idx);
            competitor.account_id = self.player_accounts.get(1).cloned();
        }

        info!(
            "New session {:#x} (format {}): tracking car {}{}",
            header.session_uid,
            header.packet_format,
            player,
            secondary
                .map(|idx| format!(" and car {}", idx))
                .unwrap_or_default()
        );
    }

    fn apply_session(&self, store: &mut TelemetryStore, data: &SessionData, packet_format: u16) {
        let kind = session_kind_from_raw(data.session_type, self.numbering.resolve(packet_format));
        let yellow_sector = data.yellow_sector();

        for c in store.competitors_mut() {
            c.session_type_raw = data.session_type;
            c.session_kind = kind;
            c.track_id = data.track_id;
            c.total_laps = data.total_laps;
            c.track_length_m = data.track_length_m;
            c.track_temp_c = data.track_temp_c;
            c.air_temp_c = data.air_temp_c;
            c.weather = data.weather;
            c.safety_car_status = data.safety_car_status;
            c.yellow_sector = yellow_sector;
            c.forecast.clone_from(&data.forecast);
        }
    }
}

fn apply_lap_data(store: &mut TelemetryStore, entries: &[LapEntry]) {
    for (idx, entry) in entries.iter().enumerate() {
        if let Some(car) = store.get_snapshot(idx as u8) {
            car.position = entry.position;
            car.current_lap = entry.current_lap;
            car.pit_status = entry.pit_status;
            car.gap_ahead_s = ms_to_secs(entry.delta_to_car_in_front_ms);
            car.gap_to_leader_s = ms_to_secs(entry.delta_to_leader_ms);
        }
    }

    for idx in store.tracked_indices() {
        let Some(entry) = entries.get(usize::from(idx)) else {
            continue;
        };
        // The car behind's gap to its car in front is our gap behind
        let gap_behind = match entry.position {
            0 => 0.0,
            pos => store
                .find_by_position(pos.saturating_add(1))
                .map_or(0.0, |car| car.gap_ahead_s),
        };
        if let Some(c) = store.competitor_mut(idx) {
            apply_lap_entry(c, entry, gap_behind);
        }
    }
}

fn apply_lap_entry(c: &mut CompetitorState, e: &LapEntry, gap_behind_s: f32) {
    if e.position != c.position {
        c.prev_position = c.position;
    }
    c.position = e.position;
    c.grid_position = e.grid_position;

    if e.current_lap != c.current_lap {
        if c.current_lap > 0 && e.current_lap > c.current_lap {
            // Lap rollover: the split and invalid flag still describe the
            // lap that just finished
            c.last_lap_sector1_ms = c.sector1_ms;
            c.last_lap_sector2_ms = c.sector2_ms;
            let lap = e.last_lap_time_ms;
            if lap > 0 && !c.lap_invalid && (c.best_lap_time_ms == 0 || lap < c.best_lap_time_ms) {
                c.best_lap_time_ms = lap;
            }
        }
        c.max_speed_this_lap_kph = 0;
    }
    c.current_lap = e.current_lap;
    c.current_lap_time_ms = e.current_lap_time_ms;
    c.last_lap_time_ms = e.last_lap_time_ms;
    c.sector = e.sector;
    c.sector1_ms = e.sector1_ms;
    c.sector2_ms = e.sector2_ms;
    c.lap_distance_m = e.lap_distance_m;
    c.lap_invalid = e.lap_invalid;

    let was_in_pit = c.in_pit();
    c.pit_status = e.pit_status;
    if was_in_pit && e.pit_status == 0 {
        c.tyre_change_lap = e.current_lap;
        debug!("Tyre change inferred on lap {} for car {}", e.current_lap, c.car_index);
    }
    c.num_pit_stops = e.num_pit_stops;
    c.driver_status = e.driver_status;
    infer_tyre_age(c);

    c.prev_gap_ahead_s = c.gap_ahead_s;
    c.gap_ahead_s = ms_to_secs(e.delta_to_car_in_front_ms);
    c.gap_to_leader_s = ms_to_secs(e.delta_to_leader_ms);
    c.gap_behind_s = gap_behind_s;

    c.penalty_seconds = e.penalty_seconds;
    c.warnings = e.warnings;
    c.unserved_drive_through = e.unserved_drive_through;
    c.unserved_stop_go = e.unserved_stop_go;
}

fn apply_car_telemetry(store: &mut TelemetryStore, entries: &[TelemetryEntry]) {
    for c in store.competitors_mut() {
        let Some(e) = entries.get(usize::from(c.car_index)) else {
            continue;
        };
        c.speed_kph = e.speed_kph;
        c.max_speed_this_lap_kph = c.max_speed_this_lap_kph.max(e.speed_kph);
        c.drs_open = e.drs_open;
        c.tyre_inner_temp_c = e.inner_temp_c;
    }
}

fn apply_car_status(store: &mut TelemetryStore, entries: &[StatusEntry]) {
    for c in store.competitors_mut() {
        let Some(e) = entries.get(usize::from(c.car_index)) else {
            continue;
        };
        c.fuel_mix = e.fuel_mix;
        c.fuel_mass_kg = e.fuel_mass_kg;
        c.fuel_remaining_laps = e.fuel_remaining_laps;
        c.drs_allowed = e.drs_allowed;
        c.visual_compound = e.visual_compound;
        c.tyre_age_laps = e.tyre_age_laps;
        c.fia_flag = e.fia_flag;
        c.ers_store_fraction = (e.ers_store_j / ERS_STORE_CAPACITY_J).clamp(0.0, 1.0);
        c.ers_deploy_mode = e.ers_deploy_mode;
        infer_tyre_age(c);
    }
}

fn apply_car_damage(store: &mut TelemetryStore, entries: &[DamageEntry]) {
    for (idx, entry) in entries.iter().enumerate() {
        if let Some(car) = store.get_snapshot(idx as u8) {
            car.max_damage = entry.damage_state().worst();
        }
    }
    for c in store.competitors_mut() {
        let Some(e) = entries.get(usize::from(c.car_index)) else {
            continue;
        };
        c.tyre_wear = e.normalised_wear();
        c.damage = e.damage_state();
    }
}

fn apply_participants(store: &mut TelemetryStore, participants: &Participants) {
    for c in store.competitors_mut() {
        c.total_participants = participants.num_active_cars;
        if let Some(name) = participants
            .names
            .get(usize::from(c.car_index))
            .and_then(|raw| display_name(raw))
        {
            c.driver_name = name;
        }
    }
}

fn apply_event(store: &mut TelemetryStore, code: String) -> Option<SessionSignal> {
    match code.trim().to_ascii_uppercase().as_str() {
        "CHQF" | "SEND" => {
            info!("Session end event {}", code);
            store.finish_session();
            Some(SessionSignal::Ended { code })
        }
        "SSTA" => {
            info!("Session started");
            None
        }
        other => {
            debug!("Ignoring event {}", other);
            None
        }
    }
}

/// Age from the inferred change lap when the game reports zero
fn infer_tyre_age(c: &mut CompetitorState) {
    if c.tyre_age_laps == 0 && c.tyre_change_lap > 0 {
        c.tyre_age_laps = c.current_lap.saturating_sub(c.tyre_change_lap);
    }
}

fn ms_to_secs(ms: u32) -> f32 {
    ms as f32 / 1000.0
}

/// First token of a participant name, capitalised ("VERSTAPPEN" -> "Verstappen")
fn display_name(raw: &str) -> Option<String> {
    let token = raw.split_whitespace().next()?;
    let mut chars = token.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("LEWIS HAMILTON").as_deref(), Some("Lewis"));
        assert_eq!(display_name("  norris").as_deref(), Some("Norris"));
        assert_eq!(display_name("   "), None);
    }

    #[test]
    fn test_lap_rollover_records_best_and_splits() {
        let mut c = CompetitorState::new(0);
        let mut entry = LapEntry {
            current_lap: 2,
            sector1_ms: 28_000,
            sector2_ms: 31_000,
            ..Default::default()
        };
        apply_lap_entry(&mut c, &entry, 0.0);
        c.max_speed_this_lap_kph = 305;

        entry.current_lap = 3;
        entry.last_lap_time_ms = 88_500;
        entry.sector1_ms = 0;
        entry.sector2_ms = 0;
        apply_lap_entry(&mut c, &entry, 0.0);

        assert_eq!(c.best_lap_time_ms, 88_500);
        assert_eq!(c.last_lap_sector1_ms, 28_000);
        assert_eq!(c.last_lap_sector2_ms, 31_000);
        assert_eq!(c.max_speed_this_lap_kph, 0);
    }

    #[test]
    fn test_invalid_lap_is_not_a_best() {
        let mut c = CompetitorState::new(0);
        let mut entry = LapEntry {
            current_lap: 2,
            lap_invalid: true,
            ..Default::default()
        };
        apply_lap_entry(&mut c, &entry, 0.0);

        entry.current_lap = 3;
        entry.lap_invalid = false;
        entry.last_lap_time_ms = 80_000;
        apply_lap_entry(&mut c, &entry, 0.0);

        assert_eq!(c.best_lap_time_ms, 0);
    }

    #[test]
    fn test_pit_exit_infers_tyre_change() {
        let mut c = CompetitorState::new(0);
        let mut entry = LapEntry {
            current_lap: 4,
            pit_status: 2,
            ..Default::default()
        };
        apply_lap_entry(&mut c, &entry, 0.0);
        assert_eq!(c.tyre_change_lap, 0);

        entry.pit_status = 0;
        apply_lap_entry(&mut c, &entry, 0.0);
        assert_eq!(c.tyre_change_lap, 4);

        entry.current_lap = 7;
        c.tyre_age_laps = 0;
        apply_lap_entry(&mut c, &entry, 0.0);
        assert_eq!(c.tyre_age_laps, 3);
    }
}
