//! Application state management

use crate::audio::AudioQueue;
use boxbox_core::{AdvisoryEvent, TelemetryStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Written by the UDP listener, read by the evaluation tick and the API
    pub store: Arc<RwLock<TelemetryStore>>,

    /// Broadcast channel for advisories
    /// Multiple consumers can subscribe to receive events
    pub events_tx: broadcast::Sender<AdvisoryEvent>,

    pub audio: AudioQueue,

    /// Cleared by the watchdog while telemetry is silent
    pub telemetry_live: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(audio: AudioQueue) -> Self {
        let (events_tx, _) = broadcast::channel(100);

        Self {
            store: Arc::new(RwLock::new(TelemetryStore::new())),
            events_tx,
            audio,
            telemetry_live: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to advisories
    pub fn subscribe(&self) -> broadcast::Receiver<AdvisoryEvent> {
        self.events_tx.subscribe()
    }

    pub fn is_telemetry_live(&self) -> bool {
        self.telemetry_live.load(Ordering::SeqCst)
    }

    pub fn set_telemetry_live(&self, live: bool) {
        self.telemetry_live.store(live, Ordering::SeqCst);
    }
}
