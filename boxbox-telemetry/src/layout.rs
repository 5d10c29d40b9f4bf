//! Per-protocol-version field layouts
//!
//! Offsets are relative to the start of one per-car entry (or the payload,
//! for the session packet). The header's packet format picks the table;
//! formats outside the known range use the nearest one.

use crate::reader::PayloadReader;

/// A duration split into milliseconds and minutes parts, or a single combined
/// milliseconds field when `minutes` is `None`.
#[derive(Debug, Clone, Copy)]
pub struct SplitField {
    pub ms: usize,
    pub minutes: Option<usize>,
}

impl SplitField {
    const fn split(ms: usize, minutes: usize) -> Self {
        Self {
            ms,
            minutes: Some(minutes),
        }
    }

    const fn combined(ms: usize) -> Self {
        Self { ms, minutes: None }
    }

    /// Total milliseconds
    pub fn read(&self, r: &PayloadReader<'_>) -> u32 {
        let minutes = self.minutes.map_or(0, |offset| u32::from(r.u8(offset)));
        u32::from(r.u16(self.ms)) + minutes * 60_000
    }

    /// Write `total_ms` into `entry`, the inverse of [`SplitField::read`]
    pub fn write(&self, entry: &mut [u8], total_ms: u32) {
        let (ms, minutes) = match self.minutes {
            Some(_) => (total_ms % 60_000, total_ms / 60_000),
            None => (total_ms.min(u32::from(u16::MAX)), 0),
        };
        put(entry, self.ms, &(ms as u16).to_le_bytes());
        if let Some(offset) = self.minutes {
            put(entry, offset, &[minutes.min(255) as u8]);
        }
    }
}

/// Copy `bytes` into `buf` at `offset`, silently clipping at the end
pub(crate) fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    for (i, b) in bytes.iter().enumerate() {
        if let Some(slot) = buf.get_mut(offset + i) {
            *slot = *b;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LapLayout {
    pub entry_size: usize,
    pub last_lap_ms: usize,
    pub current_lap_ms: usize,
    pub sector1: SplitField,
    pub sector2: SplitField,
    pub delta_to_car_in_front: SplitField,
    pub delta_to_leader: SplitField,
    pub lap_distance: usize,
    pub car_position: usize,
    pub current_lap_num: usize,
    pub pit_status: usize,
    pub num_pit_stops: usize,
    /// Zero-based on the wire
    pub sector: usize,
    pub lap_invalid: usize,
    pub penalties: usize,
    pub warnings: usize,
    pub unserved_drive_through: usize,
    pub unserved_stop_go: usize,
    pub grid_position: usize,
    pub driver_status: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct TelemetryLayout {
    pub entry_size: usize,
    pub speed: usize,
    pub drs: usize,
    pub inner_temps: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct StatusLayout {
    pub entry_size: usize,
    pub fuel_mix: usize,
    pub fuel_in_tank: usize,
    pub fuel_remaining_laps: usize,
    pub drs_allowed: usize,
    pub visual_compound: usize,
    pub tyre_age_laps: usize,
    pub fia_flags: usize,
    pub ers_store: usize,
    pub ers_deploy_mode: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct DamageLayout {
    pub entry_size: usize,
    pub tyre_wear: usize,
    /// Front-left wing; front-right, rear wing, floor, diffuser and sidepod
    /// follow as consecutive bytes.
    pub wings: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ParticipantLayout {
    pub entry_size: usize,
    pub name: usize,
    pub name_len: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionLayout {
    pub weather: usize,
    pub track_temp: usize,
    pub air_temp: usize,
    pub total_laps: usize,
    pub track_length: usize,
    pub session_type: usize,
    pub track_id: usize,
    pub num_marshal_zones: usize,
    pub marshal_zones: usize,
    pub marshal_zone_size: usize,
    pub max_marshal_zones: usize,
    pub safety_car_status: usize,
    pub num_forecast_samples: usize,
    pub forecast_samples: usize,
    pub forecast_sample_size: usize,
    pub max_forecast_samples: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ProtocolLayout {
    pub format: u16,
    pub session: SessionLayout,
    pub lap: LapLayout,
    pub telemetry: TelemetryLayout,
    pub status: StatusLayout,
    pub damage: DamageLayout,
    pub participant: ParticipantLayout,
}

impl ProtocolLayout {
    pub fn for_format(packet_format: u16) -> &'static ProtocolLayout {
        match packet_format {
            0..=2023 => &LAYOUT_2023,
            2024 => &LAYOUT_2024,
            _ => &LAYOUT_2025,
        }
    }
}

const SESSION: SessionLayout = SessionLayout {
    weather: 0,
    track_temp: 1,
    air_temp: 2,
    total_laps: 3,
    track_length: 4,
    session_type: 6,
    track_id: 7,
    num_marshal_zones: 18,
    marshal_zones: 19,
    marshal_zone_size: 5,
    max_marshal_zones: 21,
    safety_car_status: 124,
    num_forecast_samples: 126,
    forecast_samples: 127,
    forecast_sample_size: 8,
    max_forecast_samples: 64,
};

const TELEMETRY: TelemetryLayout = TelemetryLayout {
    entry_size: 60,
    speed: 0,
    drs: 18,
    inner_temps: 34,
};

const LAP_2024: LapLayout = LapLayout {
    entry_size: 57,
    last_lap_ms: 0,
    current_lap_ms: 4,
    sector1: SplitField::split(8, 10),
    sector2: SplitField::split(11, 13),
    delta_to_car_in_front: SplitField::split(14, 16),
    delta_to_leader: SplitField::split(17, 19),
    lap_distance: 20,
    car_position: 32,
    current_lap_num: 33,
    pit_status: 34,
    num_pit_stops: 35,
    sector: 36,
    lap_invalid: 37,
    penalties: 38,
    warnings: 39,
    unserved_drive_through: 41,
    unserved_stop_go: 42,
    grid_position: 43,
    driver_status: 44,
};

const STATUS_2024: StatusLayout = StatusLayout {
    entry_size: 55,
    fuel_mix: 2,
    fuel_in_tank: 5,
    fuel_remaining_laps: 13,
    drs_allowed: 22,
    visual_compound: 26,
    tyre_age_laps: 27,
    fia_flags: 28,
    ers_store: 37,
    ers_deploy_mode: 41,
};

static LAYOUT_2023: ProtocolLayout = ProtocolLayout {
    format: 2023,
    session: SESSION,
    lap: LapLayout {
        entry_size: 50,
        last_lap_ms: 0,
        current_lap_ms: 4,
        sector1: SplitField::split(8, 10),
        sector2: SplitField::split(11, 13),
        delta_to_car_in_front: SplitField::combined(14),
        delta_to_leader: SplitField::combined(16),
        lap_distance: 18,
        car_position: 30,
        current_lap_num: 31,
        pit_status: 32,
        num_pit_stops: 33,
        sector: 34,
        lap_invalid: 35,
        penalties: 36,
        warnings: 37,
        unserved_drive_through: 39,
        unserved_stop_go: 40,
        grid_position: 41,
        driver_status: 42,
    },
    telemetry: TELEMETRY,
    status: StatusLayout {
        entry_size: 47,
        ers_store: 29,
        ers_deploy_mode: 33,
        ..STATUS_2024
    },
    damage: DamageLayout {
        entry_size: 42,
        tyre_wear: 0,
        wings: 24,
    },
    participant: ParticipantLayout {
        entry_size: 58,
        name: 7,
        name_len: 48,
    },
};

static LAYOUT_2024: ProtocolLayout = ProtocolLayout {
    format: 2024,
    session: SESSION,
    lap: LAP_2024,
    telemetry: TELEMETRY,
    status: STATUS_2024,
    damage: DamageLayout {
        entry_size: 42,
        tyre_wear: 0,
        wings: 24,
    },
    participant: ParticipantLayout {
        entry_size: 60,
        name: 7,
        name_len: 48,
    },
};

static LAYOUT_2025: ProtocolLayout = ProtocolLayout {
    format: 2025,
    session: SESSION,
    lap: LAP_2024,
    telemetry: TELEMETRY,
    status: STATUS_2024,
    // Tyre blister bytes push the wing block back by four
    damage: DamageLayout {
        entry_size: 46,
        tyre_wear: 0,
        wings: 28,
    },
    participant: ParticipantLayout {
        entry_size: 57,
        name: 7,
        name_len: 32,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_layout_is_chosen() {
        assert_eq!(ProtocolLayout::for_format(2022).format, 2023);
        assert_eq!(ProtocolLayout::for_format(2024).format, 2024);
        assert_eq!(ProtocolLayout::for_format(2026).format, 2025);
    }

    #[test]
    fn test_entry_sizes_per_version() {
        let l23 = ProtocolLayout::for_format(2023);
        let l25 = ProtocolLayout::for_format(2025);
        assert_eq!(l23.lap.entry_size, 50);
        assert_eq!(l23.status.entry_size, 47);
        assert_eq!(l25.lap.entry_size, 57);
        assert_eq!(l25.damage.entry_size, 46);
        assert_eq!(l25.participant.entry_size, 57);
    }

    #[test]
    fn test_split_field_combines_minutes() {
        let field = SplitField::split(0, 2);
        let mut buf = [0u8; 3];
        field.write(&mut buf, 83_456);
        assert_eq!(buf, [0xA0, 0x5B, 1]);
        assert_eq!(field.read(&PayloadReader::new(&buf)), 83_456);
    }

    #[test]
    fn test_combined_field_has_no_minutes() {
        let field = SplitField::combined(0);
        let buf = 1_250u16.to_le_bytes();
        assert_eq!(field.read(&PayloadReader::new(&buf)), 1_250);
    }
}
