//! Fixed 29-byte datagram header

use crate::reader::PayloadReader;
use boxbox_core::model::NUM_CARS;
use thiserror::Error;

pub const HEADER_SIZE: usize = 29;

/// Slot value meaning "no such car"
pub const NO_CAR: u8 = 255;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram too short for header: {len} bytes")]
    TruncatedHeader { len: usize },

    #[error("unsupported packet id {0}")]
    UnsupportedPacket(u8),
}

/// Packet kinds the decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketId {
    Session,
    LapData,
    Event,
    Participants,
    CarTelemetry,
    CarStatus,
    CarDamage,
}

impl PacketId {
    pub fn from_wire(id: u8) -> Option<Self> {
        match id {
            1 => Some(PacketId::Session),
            2 => Some(PacketId::LapData),
            3 => Some(PacketId::Event),
            4 => Some(PacketId::Participants),
            6 => Some(PacketId::CarTelemetry),
            7 => Some(PacketId::CarStatus),
            10 => Some(PacketId::CarDamage),
            _ => None,
        }
    }

    pub fn wire_id(self) -> u8 {
        match self {
            PacketId::Session => 1,
            PacketId::LapData => 2,
            PacketId::Event => 3,
            PacketId::Participants => 4,
            PacketId::CarTelemetry => 6,
            PacketId::CarStatus => 7,
            PacketId::CarDamage => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketHeader {
    pub packet_format: u16,
    pub game_year: u8,
    pub game_major_version: u8,
    pub game_minor_version: u8,
    pub packet_version: u8,
    pub packet_id: u8,
    pub session_uid: u64,
    pub session_time: f32,
    pub frame_identifier: u32,
    pub overall_frame_identifier: u32,
    pub player_car_index: u8,
    pub secondary_player_car_index: u8,
}

impl PacketHeader {
    pub fn parse(datagram: &[u8]) -> Result<Self, DecodeError> {
        if datagram.len() < HEADER_SIZE {
            return Err(DecodeError::TruncatedHeader {
                len: datagram.len(),
            });
        }
        let r = PayloadReader::new(datagram);
        Ok(Self {
            packet_format: r.u16(0),
            game_year: r.u8(2),
            game_major_version: r.u8(3),
            game_minor_version: r.u8(4),
            packet_version: r.u8(5),
            packet_id: r.u8(6),
            session_uid: r.u64(7),
            session_time: r.f32(15),
            frame_identifier: r.u32(19),
            overall_frame_identifier: r.u32(23),
            player_car_index: r.u8(27),
            secondary_player_car_index: r.u8(28),
        })
    }

    pub fn packet_kind(&self) -> Option<PacketId> {
        PacketId::from_wire(self.packet_id)
    }

    /// Player slot, if it names a real car
    pub fn player_slot(&self) -> Option<u8> {
        valid_slot(self.player_car_index)
    }

    pub fn secondary_slot(&self) -> Option<u8> {
        valid_slot(self.secondary_player_car_index)
    }
}

fn valid_slot(index: u8) -> Option<u8> {
    (usize::from(index) < NUM_CARS).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header() -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(&2025u16.to_le_bytes());
        buf.extend_from_slice(&[25, 1, 4, 1, 2]);
        buf.extend_from_slice(&0xDEAD_BEEFu64.to_le_bytes());
        buf.extend_from_slice(&12.5f32.to_le_bytes());
        buf.extend_from_slice(&400u32.to_le_bytes());
        buf.extend_from_slice(&401u32.to_le_bytes());
        buf.extend_from_slice(&[3, NO_CAR]);
        buf
    }

    #[test]
    fn test_parse_header_fields() {
        let header = PacketHeader::parse(&raw_header()).unwrap();
        assert_eq!(header.packet_format, 2025);
        assert_eq!(header.packet_kind(), Some(PacketId::LapData));
        assert_eq!(header.session_uid, 0xDEAD_BEEF);
        assert_eq!(header.session_time, 12.5);
        assert_eq!(header.overall_frame_identifier, 401);
        assert_eq!(header.player_slot(), Some(3));
        assert_eq!(header.secondary_slot(), None);
    }

    #[test]
    fn test_short_header_is_rejected() {
        let raw = raw_header();
        assert_eq!(
            PacketHeader::parse(&raw[..20]),
            Err(DecodeError::TruncatedHeader { len: 20 })
        );
    }

    #[test]
    fn test_unknown_packet_id() {
        assert_eq!(PacketId::from_wire(0), None);
        assert_eq!(PacketId::from_wire(10), Some(PacketId::CarDamage));
        assert_eq!(PacketId::CarStatus.wire_id(), 7);
    }
}
