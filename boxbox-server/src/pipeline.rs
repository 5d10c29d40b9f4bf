//! Delivery pipeline
//!
//! This module handles:
//! - The evaluation tick: snapshot the store, run the trigger engine, publish
//!   advisories and forward them to the dispatcher without ever blocking
//! - Session signals from the decoder (new session, chequered flag)
//! - Lap-completion edges, forwarded to the lap recorder
//! - The liveness watchdog on the last-packet timestamp
//! - The dispatcher: text generation with a timeout and fallback, speech
//!   synthesis, then hand-off to the audio queue

use crate::audio::{AudioQueue, Delivery};
use crate::config::Config;
use crate::state::AppState;
use boxbox_core::{
    AdvisoryEvent, LapRecord, LapRecorder, SpeechSynthesizer, StoreView, TextGenerator,
    TriggerEngine,
};
use boxbox_telemetry::SessionSignal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Advisories waiting for text generation
pub const DISPATCH_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tick_interval: Duration,
    pub watchdog_interval: Duration,
    pub telemetry_timeout: Duration,
    /// Zero warns once per disconnect
    pub telemetry_lost_cooldown: Duration,
    pub generation_timeout: Duration,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            watchdog_interval: Duration::from_secs(config.watchdog_interval_secs.max(1)),
            telemetry_timeout: Duration::from_secs(config.telemetry_timeout_secs),
            telemetry_lost_cooldown: Duration::from_secs(config.telemetry_lost_cooldown_secs),
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Trigger engine plus the per-car lap bookkeeping of the evaluation task
pub struct Evaluator {
    engine: TriggerEngine,
    last_saved_lap: HashMap<u8, u8>,
}

impl Evaluator {
    pub fn new(engine: TriggerEngine) -> Self {
        Self {
            engine,
            last_saved_lap: HashMap::new(),
        }
    }

    /// Evaluate every tracked competitor
    pub fn tick(&mut self, view: &StoreView, now: Instant) -> Vec<AdvisoryEvent> {
        let tracked: Vec<u8> = view.competitors.iter().map(|c| c.car_index).collect();
        self.engine.retain(&tracked);

        view.competitors
            .iter()
            .flat_map(|c| self.engine.evaluate(c, &view.field, now))
            .collect()
    }

    pub fn on_signal(&mut self, signal: &SessionSignal, view: &StoreView) -> Vec<AdvisoryEvent> {
        match signal {
            SessionSignal::Changed { session_uid } => {
                info!("Session {:#x} started, resetting triggers", session_uid);
                for c in &view.competitors {
                    self.engine.reset_session(c.car_index);
                }
                self.last_saved_lap.clear();
                Vec::new()
            }
            SessionSignal::Ended { code } => {
                debug!("Session end signal {}", code);
                view.competitors
                    .iter()
                    .filter_map(|c| self.engine.on_chequered_flag(c, &view.field))
                    .collect()
            }
        }
    }

    /// Apply every signal already queued, so a tick never evaluates a new
    /// session against the previous session's trigger memory
    pub fn drain_signals(
        &mut self,
        signals: &mut mpsc::Receiver<SessionSignal>,
        view: &StoreView,
    ) -> Vec<AdvisoryEvent> {
        let mut events = Vec::new();
        while let Ok(signal) = signals.try_recv() {
            events.extend(self.on_signal(&signal, view));
        }
        events
    }

    /// Laps completed since the last call, at most one per car
    pub fn completed_laps(&mut self, view: &StoreView) -> Vec<LapRecord> {
        let mut records = Vec::new();
        for c in &view.competitors {
            let completed = c.completed_laps();
            let saved = self.last_saved_lap.get(&c.car_index).copied().unwrap_or(0);
            if completed == 0 || completed <= saved || c.last_lap_time_ms == 0 {
                continue;
            }
            self.last_saved_lap.insert(c.car_index, completed);
            records.push(LapRecord::completed(c, completed));
        }
        records
    }
}

/// Evaluation task: one tick per interval, plus session signals as they
/// arrive. Never waits on downstream work.
pub async fn run_evaluation(
    state: AppState,
    mut evaluator: Evaluator,
    mut signals: mpsc::Receiver<SessionSignal>,
    dispatch: mpsc::Sender<AdvisoryEvent>,
    recorder: Arc<dyn LapRecorder>,
    tick_interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Evaluation loop started ({:?} tick)", tick_interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(signal) = signals.recv() => {
                let view = state.store.read().await.view();
                let events = evaluator.on_signal(&signal, &view);
                publish(&state, &dispatch, events);
            }
            _ = ticker.tick() => {
                let view = state.store.read().await.view();
                let mut events = evaluator.drain_signals(&mut signals, &view);
                events.extend(evaluator.tick(&view, Instant::now()));
                publish(&state, &dispatch, events);

                for lap in evaluator.completed_laps(&view) {
                    let recorder = recorder.clone();
                    tokio::spawn(async move {
                        if let Err(e) = recorder.record(&lap).await {
                            warn!("Failed to record lap {}: {}", lap.lap_number, e);
                        }
                    });
                }
            }
        }
    }
    info!("Evaluation loop stopped");
}

fn publish(state: &AppState, dispatch: &mpsc::Sender<AdvisoryEvent>, events: Vec<AdvisoryEvent>) {
    for event in events {
        debug!("{} for car {}", event.kind().name(), event.car_index());
        // Ignore error if no receivers (they'll get the next event)
        let _ = state.events_tx.send(event.clone());

        match dispatch.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Dispatcher busy, dropping {}", event.kind().name());
            }
            Err(TrySendError::Closed(event)) => {
                warn!("Dispatcher gone, dropping {}", event.kind().name());
            }
        }
    }
}

// ============================================================================
// Watchdog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Nothing received yet
    Waiting,
    Live,
    Resumed,
    Lost { warn: bool },
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    cooldown: Duration,
    lost: bool,
    warned_at: Option<Instant>,
}

impl Watchdog {
    pub fn new(timeout: Duration, cooldown: Duration) -> Self {
        Self {
            timeout,
            cooldown,
            lost: false,
            warned_at: None,
        }
    }

    pub fn check(&mut self, last_packet: Option<Instant>, now: Instant) -> Liveness {
        let Some(last) = last_packet else {
            return Liveness::Waiting;
        };

        if now.saturating_duration_since(last) <= self.timeout {
            if self.lost {
                self.lost = false;
                self.warned_at = None;
                return Liveness::Resumed;
            }
            return Liveness::Live;
        }

        self.lost = true;
        let warn = match self.warned_at {
            None => true,
            Some(_) if self.cooldown.is_zero() => false,
            Some(at) => now.saturating_duration_since(at) >= self.cooldown,
        };
        if warn {
            self.warned_at = Some(now);
        }
        Liveness::Lost { warn }
    }
}

pub async fn run_watchdog(
    state: AppState,
    mut watchdog: Watchdog,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let last_packet = state.store.read().await.last_packet_at();
        match watchdog.check(last_packet, Instant::now()) {
            Liveness::Waiting => {}
            Liveness::Live => state.set_telemetry_live(true),
            Liveness::Resumed => {
                info!("Telemetry resumed");
                state.set_telemetry_live(true);
            }
            Liveness::Lost { warn } => {
                state.set_telemetry_live(false);
                if warn {
                    warn!(
                        "No telemetry for over {:?}; is the game's UDP output enabled?",
                        watchdog.timeout
                    );
                }
            }
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
}

pub async fn run_dispatcher(
    mut rx: mpsc::Receiver<AdvisoryEvent>,
    collaborators: Collaborators,
    queue: AudioQueue,
    generation_timeout: Duration,
    shutdown: CancellationToken,
) {
    info!(
        "Dispatcher started ({} -> {})",
        collaborators.text.name(),
        collaborators.speech.name()
    );
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        dispatch(&event, &collaborators, &queue, generation_timeout).await;
    }
}

/// Turn one advisory into audio on the queue. Returns `None` when the
/// advisory was dropped.
pub async fn dispatch(
    event: &AdvisoryEvent,
    collaborators: &Collaborators,
    queue: &AudioQueue,
    generation_timeout: Duration,
) -> Option<Delivery> {
    let text = generate_text(collaborators.text.as_ref(), event, generation_timeout).await;

    let clip = match collaborators.speech.synthesize(&text).await {
        Ok(clip) => clip,
        Err(e) => {
            warn!("Speech synthesis failed for {}: {}", event.kind().name(), e);
            return None;
        }
    };

    match queue.deliver(clip, event.priority()) {
        Ok(delivery) => Some(delivery),
        Err(e) => {
            warn!("Dropping {}: {}", event.kind().name(), e);
            None
        }
    }
}

/// Generated text, or the kind's fallback line on error, timeout or blank
/// output
pub async fn generate_text(
    generator: &dyn TextGenerator,
    event: &AdvisoryEvent,
    timeout: Duration,
) -> String {
    let fallback = event.kind().fallback_line();
    match tokio::time::timeout(timeout, generator.generate(event)).await {
        Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(Ok(_)) => {
            warn!("{} returned no text, using fallback", generator.name());
            fallback.to_string()
        }
        Ok(Err(e)) => {
            warn!("{} failed: {}, using fallback", generator.name(), e);
            fallback.to_string()
        }
        Err(_) => {
            warn!("{} timed out after {:?}, using fallback", generator.name(), timeout);
            fallback.to_string()
        }
    }
}
