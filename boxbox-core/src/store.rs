//! Keyed store of competitor and field state
//!
//! Single writer (the packet decoder), single reader (the evaluation tick).
//! Callers wrap the store in whatever lock their runtime needs; every method
//! here is synchronous and never blocks.

use crate::model::{CarSnapshot, CompetitorState, NUM_CARS};
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct TelemetryStore {
    competitors: BTreeMap<u8, CompetitorState>,
    field: [CarSnapshot; NUM_CARS],
    session_uid: Option<u64>,
    packet_format: u16,
    last_packet_at: Option<Instant>,
    packets_received: u64,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self {
            competitors: BTreeMap::new(),
            field: std::array::from_fn(|idx| CarSnapshot {
                car_index: idx as u8,
                ..Default::default()
            }),
            session_uid: None,
            packet_format: 0,
            last_packet_at: None,
            packets_received: 0,
        }
    }

    /// Competitor for a car slot, created on first sight
    pub fn get_or_create(&mut self, car_index: u8) -> &mut CompetitorState {
        self.competitors
            .entry(car_index)
            .or_insert_with(|| CompetitorState::new(car_index))
    }

    pub fn competitor(&self, car_index: u8) -> Option<&CompetitorState> {
        self.competitors.get(&car_index)
    }

    pub fn competitor_mut(&mut self, car_index: u8) -> Option<&mut CompetitorState> {
        self.competitors.get_mut(&car_index)
    }

    pub fn competitors(&self) -> impl Iterator<Item = &CompetitorState> {
        self.competitors.values()
    }

    pub fn competitors_mut(&mut self) -> impl Iterator<Item = &mut CompetitorState> {
        self.competitors.values_mut()
    }

    pub fn is_tracked(&self, car_index: u8) -> bool {
        self.competitors.contains_key(&car_index)
    }

    pub fn tracked_indices(&self) -> Vec<u8> {
        self.competitors.keys().copied().collect()
    }

    /// Snapshot for any slot in the field; `None` for out-of-range indices
    pub fn get_snapshot(&mut self, car_index: u8) -> Option<&mut CarSnapshot> {
        self.field.get_mut(usize::from(car_index))
    }

    pub fn snapshot(&self, car_index: u8) -> Option<&CarSnapshot> {
        self.field.get(usize::from(car_index))
    }

    pub fn field(&self) -> &[CarSnapshot; NUM_CARS] {
        &self.field
    }

    /// Linear scan of the field for the car currently holding `position`
    pub fn find_by_position(&self, position: u8) -> Option<&CarSnapshot> {
        find_by_position(&self.field, position)
    }

    pub fn session_uid(&self) -> Option<u64> {
        self.session_uid
    }

    pub fn packet_format(&self) -> u16 {
        self.packet_format
    }

    /// Record that a datagram arrived, decodable or not
    pub fn mark_packet(&mut self, at: Instant) {
        self.last_packet_at = Some(at);
        self.packets_received += 1;
    }

    pub fn last_packet_at(&self) -> Option<Instant> {
        self.last_packet_at
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    /// Start a new session: drop every competitor and field snapshot.
    /// Tracked slots are resolved again by the caller.
    pub fn begin_session(&mut self, session_uid: u64, packet_format: u16) {
        self.session_uid = Some(session_uid);
        self.packet_format = packet_format;
        self.competitors.clear();
        for (idx, car) in self.field.iter_mut().enumerate() {
            *car = CarSnapshot {
                car_index: idx as u8,
                ..Default::default()
            };
        }
    }

    /// Set `session_finished` on every competitor
    pub fn finish_session(&mut self) {
        for competitor in self.competitors.values_mut() {
            competitor.session_finished = true;
        }
    }

    /// Immutable copy handed to the evaluation tick
    pub fn view(&self) -> StoreView {
        StoreView {
            competitors: self.competitors.values().cloned().collect(),
            field: self.field,
        }
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the store, read without holding any lock
#[derive(Debug, Clone)]
pub struct StoreView {
    pub competitors: Vec<CompetitorState>,
    pub field: [CarSnapshot; NUM_CARS],
}

impl StoreView {
    pub fn find_by_position(&self, position: u8) -> Option<&CarSnapshot> {
        find_by_position(&self.field, position)
    }
}

pub fn find_by_position(field: &[CarSnapshot], position: u8) -> Option<&CarSnapshot> {
    if position == 0 {
        return None;
    }
    field.iter().find(|car| car.position == position)
}
