//! Typed records decoded from datagram payloads
//!
//! Only the fields the trigger engine needs are decoded. Per-car packets
//! yield one entry per car slot whose entry starts inside the payload; a
//! truncated entry reads its missing tail as zero.

use crate::header::{DecodeError, PacketHeader, PacketId, HEADER_SIZE};
use crate::layout::{LapLayout, ProtocolLayout, SessionLayout};
use crate::reader::PayloadReader;
use boxbox_core::model::{Corners, DamageState, ForecastSample, NUM_CARS};

/// Zone start fractions marking the end of sectors one and two
const SECTOR1_END: f32 = 0.35;
const SECTOR2_END: f32 = 0.67;

const ZONE_FLAG_YELLOW: i8 = 3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionData {
    pub weather: u8,
    pub track_temp_c: i8,
    pub air_temp_c: i8,
    pub total_laps: u8,
    pub track_length_m: u16,
    pub session_type: u8,
    pub track_id: i8,
    pub safety_car_status: u8,
    pub marshal_zones: Vec<MarshalZone>,
    pub forecast: Vec<ForecastSample>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarshalZone {
    /// Fraction of the lap where the zone starts
    pub zone_start: f32,
    pub flag: i8,
}

impl SessionData {
    /// Sector (1-3) of the first yellow-flagged marshal zone
    pub fn yellow_sector(&self) -> Option<u8> {
        let zone = self
            .marshal_zones
            .iter()
            .find(|z| z.flag == ZONE_FLAG_YELLOW)?;
        Some(if zone.zone_start < SECTOR1_END {
            1
        } else if zone.zone_start < SECTOR2_END {
            2
        } else {
            3
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LapEntry {
    pub last_lap_time_ms: u32,
    pub current_lap_time_ms: u32,
    pub sector1_ms: u32,
    pub sector2_ms: u32,
    pub delta_to_car_in_front_ms: u32,
    pub delta_to_leader_ms: u32,
    pub lap_distance_m: f32,
    pub position: u8,
    pub current_lap: u8,
    pub pit_status: u8,
    pub num_pit_stops: u8,
    /// 1-based
    pub sector: u8,
    pub lap_invalid: bool,
    pub penalty_seconds: u8,
    pub warnings: u8,
    pub unserved_drive_through: u8,
    pub unserved_stop_go: u8,
    pub grid_position: u8,
    pub driver_status: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryEntry {
    pub speed_kph: u16,
    pub drs_open: bool,
    pub inner_temp_c: Corners<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusEntry {
    pub fuel_mix: u8,
    pub fuel_mass_kg: f32,
    pub fuel_remaining_laps: f32,
    pub drs_allowed: bool,
    pub visual_compound: u8,
    pub tyre_age_laps: u8,
    pub fia_flag: i8,
    pub ers_store_j: f32,
    pub ers_deploy_mode: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DamageEntry {
    /// Raw wear as sent: percentages, or 0-1 fractions on some builds
    pub tyre_wear: Corners<f32>,
    pub front_left_wing: u8,
    pub front_right_wing: u8,
    pub rear_wing: u8,
    pub floor: u8,
    pub diffuser: u8,
    pub sidepod: u8,
}

impl DamageEntry {
    /// Wear on the 0-100 scale, scaling up fractional readings
    pub fn normalised_wear(&self) -> Corners<f32> {
        let values = self.tyre_wear.values();
        let fractional = values.iter().all(|v| (0.0..=1.0).contains(v));
        let scale = if fractional { 100.0 } else { 1.0 };
        self.tyre_wear.map(|v| (v * scale).clamp(0.0, 100.0))
    }

    pub fn damage_state(&self) -> DamageState {
        DamageState {
            front_wing: f32::from(self.front_left_wing.max(self.front_right_wing)),
            rear_wing: f32::from(self.rear_wing),
            floor: f32::from(self.floor),
            diffuser: f32::from(self.diffuser),
            sidepods: f32::from(self.sidepod),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Participants {
    pub num_active_cars: u8,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Session(SessionData),
    LapData(Vec<LapEntry>),
    Event(String),
    Participants(Participants),
    CarTelemetry(Vec<TelemetryEntry>),
    CarStatus(Vec<StatusEntry>),
    CarDamage(Vec<DamageEntry>),
}

impl Packet {
    pub fn id(&self) -> PacketId {
        match self {
            Packet::Session(_) => PacketId::Session,
            Packet::LapData(_) => PacketId::LapData,
            Packet::Event(_) => PacketId::Event,
            Packet::Participants(_) => PacketId::Participants,
            Packet::CarTelemetry(_) => PacketId::CarTelemetry,
            Packet::CarStatus(_) => PacketId::CarStatus,
            Packet::CarDamage(_) => PacketId::CarDamage,
        }
    }

    /// Decode the payload following an already-parsed header
    pub fn decode(header: &PacketHeader, datagram: &[u8]) -> Result<Packet, DecodeError> {
        let kind = header
            .packet_kind()
            .ok_or(DecodeError::UnsupportedPacket(header.packet_id))?;
        let layout = ProtocolLayout::for_format(header.packet_format);
        let payload = PayloadReader::new(datagram.get(HEADER_SIZE..).unwrap_or_default());

        Ok(match kind {
            PacketId::Session => Packet::Session(parse_session(&payload, &layout.session)),
            PacketId::LapData => Packet::LapData(per_car(&payload, 0, layout.lap.entry_size, |r| {
                parse_lap_entry(&r, &layout.lap)
            })),
            PacketId::Event => Packet::Event(payload.text(0, 4)),
            PacketId::Participants => {
                let p = &layout.participant;
                Packet::Participants(Participants {
                    num_active_cars: payload.u8(0),
                    names: per_car(&payload, 1, p.entry_size, |r| r.text(p.name, p.name_len)),
                })
            }
            PacketId::CarTelemetry => {
                let t = &layout.telemetry;
                Packet::CarTelemetry(per_car(&payload, 0, t.entry_size, |r| TelemetryEntry {
                    speed_kph: r.u16(t.speed),
                    drs_open: r.u8(t.drs) == 1,
                    inner_temp_c: Corners::from_wire(r.u8_array::<4>(t.inner_temps)).map(f32::from),
                }))
            }
            PacketId::CarStatus => {
                let s = &layout.status;
                Packet::CarStatus(per_car(&payload, 0, s.entry_size, |r| StatusEntry {
                    fuel_mix: r.u8(s.fuel_mix),
                    fuel_mass_kg: r.f32(s.fuel_in_tank),
                    fuel_remaining_laps: r.f32(s.fuel_remaining_laps),
                    drs_allowed: r.u8(s.drs_allowed) == 1,
                    visual_compound: r.u8(s.visual_compound),
                    tyre_age_laps: r.u8(s.tyre_age_laps),
                    fia_flag: r.i8(s.fia_flags),
                    ers_store_j: r.f32(s.ers_store),
                    ers_deploy_mode: r.u8(s.ers_deploy_mode),
                }))
            }
            PacketId::CarDamage => {
                let d = &layout.damage;
                Packet::CarDamage(per_car(&payload, 0, d.entry_size, |r| {
                    let [fl, fr, rear, floor, diffuser, sidepod] = r.u8_array::<6>(d.wings);
                    DamageEntry {
                        tyre_wear: Corners::from_wire(r.f32_array::<4>(d.tyre_wear)),
                        front_left_wing: fl,
                        front_right_wing: fr,
                        rear_wing: rear,
                        floor,
                        diffuser,
                        sidepod,
                    }
                }))
            }
        })
    }
}

/// Entries for every car slot whose entry starts inside the payload
fn per_car<'a, T>(
    payload: &PayloadReader<'a>,
    start: usize,
    entry_size: usize,
    parse: impl Fn(PayloadReader<'a>) -> T,
) -> Vec<T> {
    (0..NUM_CARS)
        .map(|idx| start + idx * entry_size)
        .take_while(|offset| *offset < payload.len())
        .map(|offset| parse(payload.slice(offset, entry_size)))
        .collect()
}

fn parse_session(r: &PayloadReader<'_>, l: &SessionLayout) -> SessionData {
    let zone_count = usize::from(r.u8(l.num_marshal_zones)).min(l.max_marshal_zones);
    let marshal_zones = (0..zone_count)
        .map(|i| {
            let at = l.marshal_zones + i * l.marshal_zone_size;
            MarshalZone {
                zone_start: r.f32(at),
                flag: r.i8(at + 4),
            }
        })
        .collect();

    let sample_count = usize::from(r.u8(l.num_forecast_samples)).min(l.max_forecast_samples);
    let forecast = (0..sample_count)
        .map(|i| {
            let at = l.forecast_samples + i * l.forecast_sample_size;
            ForecastSample {
                session_type: r.u8(at),
                time_offset_min: r.u8(at + 1),
                weather: r.u8(at + 2),
                rain_percentage: r.u8(at + 7),
            }
        })
        .collect();

    SessionData {
        weather: r.u8(l.weather),
        track_temp_c: r.i8(l.track_temp),
        air_temp_c: r.i8(l.air_temp),
        total_laps: r.u8(l.total_laps),
        track_length_m: r.u16(l.track_length),
        session_type: r.u8(l.session_type),
        track_id: r.i8(l.track_id),
        safety_car_status: r.u8(l.safety_car_status),
        marshal_zones,
        forecast,
    }
}

fn parse_lap_entry(r: &PayloadReader<'_>, l: &LapLayout) -> LapEntry {
    LapEntry {
        last_lap_time_ms: r.u32(l.last_lap_ms),
        current_lap_time_ms: r.u32(l.current_lap_ms),
        sector1_ms: l.sector1.read(r),
        sector2_ms: l.sector2.read(r),
        delta_to_car_in_front_ms: l.delta_to_car_in_front.read(r),
        delta_to_leader_ms: l.delta_to_leader.read(r),
        lap_distance_m: r.f32(l.lap_distance),
        position: r.u8(l.car_position),
        current_lap: r.u8(l.current_lap_num),
        pit_status: r.u8(l.pit_status),
        num_pit_stops: r.u8(l.num_pit_stops),
        sector: r.u8(l.sector).saturating_add(1),
        lap_invalid: r.u8(l.lap_invalid) != 0,
        penalty_seconds: r.u8(l.penalties),
        warnings: r.u8(l.warnings),
        unserved_drive_through: r.u8(l.unserved_drive_through),
        unserved_stop_go: r.u8(l.unserved_stop_go),
        grid_position: r.u8(l.grid_position),
        driver_status: r.u8(l.driver_status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yellow_sector_from_first_yellow_zone() {
        let mut session = SessionData::default();
        assert_eq!(session.yellow_sector(), None);

        session.marshal_zones = vec![
            MarshalZone { zone_start: 0.1, flag: 1 },
            MarshalZone { zone_start: 0.5, flag: 3 },
            MarshalZone { zone_start: 0.8, flag: 3 },
        ];
        assert_eq!(session.yellow_sector(), Some(2));

        session.marshal_zones[1].zone_start = 0.2;
        assert_eq!(session.yellow_sector(), Some(1));
    }

    #[test]
    fn test_fractional_wear_is_scaled() {
        let entry = DamageEntry {
            tyre_wear: Corners::from_wire([0.1, 0.2, 0.15, 0.5]),
            ..Default::default()
        };
        let wear = entry.normalised_wear();
        assert!((wear.front_right - 50.0).abs() < 1e-4);
        assert!((wear.rear_left - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_percentage_wear_is_kept_and_clamped() {
        let entry = DamageEntry {
            tyre_wear: Corners::from_wire([12.0, 0.5, 130.0, 40.0]),
            ..Default::default()
        };
        let wear = entry.normalised_wear();
        assert_eq!(wear.rear_left, 12.0);
        assert_eq!(wear.rear_right, 0.5);
        assert_eq!(wear.front_left, 100.0);
    }

    #[test]
    fn test_front_wing_is_worst_side() {
        let entry = DamageEntry {
            front_left_wing: 10,
            front_right_wing: 35,
            floor: 20,
            ..Default::default()
        };
        let damage = entry.damage_state();
        assert_eq!(damage.front_wing, 35.0);
        assert_eq!(damage.worst(), 35.0);
    }
}
