//! Audio delivery queue
//!
//! Serializes spoken delivery of advisory clips on one [`AudioOutput`]. Each
//! clip carries its advisory priority (lower is more urgent). Routine clips
//! wait in a small bounded queue; urgent clips may preempt whatever is
//! playing, in which case the current clip is stopped and every pending clip
//! is discarded as stale.
//!
//! A single playback task ([`AudioQueue::run`]) owns the output. It always
//! takes the preempt slot before the pending queue, so an urgent clip can
//! never be overtaken by a stale one.

use boxbox_core::trigger::DEFAULT_INTERRUPT_THRESHOLD;
use boxbox_core::{AudioClip, AudioOutput};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Marker priority while nothing is playing or queued
pub const IDLE_PRIORITY: u8 = u8::MAX;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    /// Priorities at or below this may preempt
    pub interrupt_threshold: u8,
    pub reconnect_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 2,
            interrupt_threshold: DEFAULT_INTERRUPT_THRESHOLD,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("audio queue full ({capacity} pending)")]
    Full { capacity: usize },
}

/// How [`AudioQueue::deliver`] handled a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Current playback stopped, pending clips dropped, clip plays next
    Preempted,
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePhase {
    Idle,
    Playing,
    /// Preemption decided; the interrupted clip is being stopped
    Draining,
    Reconnecting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub phase: QueuePhase,
    pub current_priority: Option<u8>,
    pub pending: usize,
    pub muted: bool,
    pub connected: bool,
}

struct QueueItem {
    clip: AudioClip,
    priority: u8,
}

struct QueueState {
    pending: VecDeque<QueueItem>,
    preempt: Option<QueueItem>,
    current_priority: u8,
    phase: QueuePhase,
    /// Cancels the clip currently on the output
    playback: Option<Playback>,
    next_playback_id: u64,
}

struct Playback {
    id: u64,
    token: CancellationToken,
}

impl QueueState {
    fn best_pending(&self) -> u8 {
        self.pending
            .iter()
            .map(|item| item.priority)
            .min()
            .unwrap_or(IDLE_PRIORITY)
    }

    fn settle(&mut self) {
        if self.preempt.is_none() {
            self.current_priority = IDLE_PRIORITY;
            self.phase = QueuePhase::Idle;
        }
    }
}

struct Inner {
    config: QueueConfig,
    output: Arc<dyn AudioOutput>,
    state: Mutex<QueueState>,
    wake: Notify,
    muted: AtomicBool,
}

#[derive(Clone)]
pub struct AudioQueue {
    inner: Arc<Inner>,
}

impl AudioQueue {
    pub fn new(config: QueueConfig, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                output,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    preempt: None,
                    current_priority: IDLE_PRIORITY,
                    phase: QueuePhase::Idle,
                    playback: None,
                    next_playback_id: 0,
                }),
                wake: Notify::new(),
                muted: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state stays consistent across a panic in another holder
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a clip, or release it and fail when the queue is full
    pub fn enqueue(&self, clip: AudioClip, priority: u8) -> Result<(), QueueError> {
        let capacity = self.inner.config.capacity;
        {
            let mut state = self.lock();
            if state.pending.len() < capacity {
                state.pending.push_back(QueueItem { clip, priority });
                drop(state);
                self.inner.wake.notify_one();
                return Ok(());
            }
        }
        warn!("Audio queue full, dropping priority {} clip", priority);
        clip.release();
        Err(QueueError::Full { capacity })
    }

    /// Play `clip` now if it is urgent and beats both the playing clip and
    /// every pending one; otherwise queue it.
    pub fn deliver(&self, clip: AudioClip, priority: u8) -> Result<Delivery, QueueError> {
        let urgent = priority <= self.inner.config.interrupt_threshold;

        let decision = {
            let mut state = self.lock();
            let preempts = urgent
                && priority < state.current_priority
                && priority < state.best_pending();
            if preempts {
                let mut stale: Vec<QueueItem> = state.pending.drain(..).collect();
                stale.extend(state.preempt.take());
                state.preempt = Some(QueueItem { clip, priority });
                state.current_priority = priority;
                let interrupted = state.playback.take();
                if interrupted.is_some() {
                    state.phase = QueuePhase::Draining;
                }
                Ok((stale, interrupted.map(|playback| playback.token)))
            } else {
                Err(clip)
            }
        };

        match decision {
            Ok((stale, interrupted)) => {
                info!(
                    "Priority {} clip preempting playback, {} stale clip(s) dropped",
                    priority,
                    stale.len()
                );
                for item in stale {
                    item.clip.release();
                }
                if let Some(token) = interrupted {
                    token.cancel();
                }
                self.inner.wake.notify_one();
                Ok(Delivery::Preempted)
            }
            Err(clip) => self.enqueue(clip, priority).map(|_| Delivery::Queued),
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::SeqCst);
        info!("Radio {}", if muted { "muted" } else { "unmuted" });
    }

    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.lock();
        QueueStatus {
            phase: state.phase,
            current_priority: (state.current_priority != IDLE_PRIORITY)
                .then_some(state.current_priority),
            pending: state.pending.len(),
            muted: self.is_muted(),
            connected: self.inner.output.is_connected(),
        }
    }

    /// Connect the output. Idempotent.
    pub async fn connect(&self) -> anyhow::Result<()> {
        self.inner.output.connect().await?;
        info!("Audio output {} connected", self.inner.output.name());
        Ok(())
    }

    pub async fn disconnect(&self) -> anyhow::Result<()> {
        let interrupted = self.lock().playback.take();
        if let Some(playback) = interrupted {
            playback.token.cancel();
        }
        self.inner.output.disconnect().await?;
        info!("Audio output {} disconnected", self.inner.output.name());
        Ok(())
    }

    /// Playback loop. Plays one clip at a time until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Audio queue started on {}", self.inner.output.name());
        loop {
            let item = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                item = self.next_item() => item,
            };
            self.play(item, &shutdown).await;
        }

        self.inner.output.stop().await;
        let mut state = self.lock();
        let leftover: Vec<QueueItem> = state.pending.drain(..).collect();
        for item in leftover.into_iter().chain(state.preempt.take()) {
            item.clip.release();
        }
        info!("Audio queue stopped");
    }

    async fn next_item(&self) -> QueueItem {
        loop {
            let next = {
                let mut state = self.lock();
                state.preempt.take().or_else(|| state.pending.pop_front())
            };
            if let Some(item) = next {
                return item;
            }
            self.inner.wake.notified().await;
        }
    }

    async fn play(&self, item: QueueItem, shutdown: &CancellationToken) {
        if self.is_muted() {
            debug!("Muted, discarding priority {} clip", item.priority);
            item.clip.release();
            self.lock().settle();
            return;
        }

        if !self.inner.output.is_connected() && !self.reconnect().await {
            item.clip.release();
            self.lock().settle();
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(self.inner.config.reconnect_delay) => {}
            }
            return;
        }

        let token = CancellationToken::new();
        let playback_id = {
            let mut state = self.lock();
            // An urgent clip arrived after this one was taken
            if state.preempt.is_some() {
                drop(state);
                debug!("Dropping priority {} clip overtaken by preemption", item.priority);
                item.clip.release();
                return;
            }
            let id = state.next_playback_id;
            state.next_playback_id += 1;
            state.playback = Some(Playback {
                id,
                token: token.clone(),
            });
            state.current_priority = item.priority;
            state.phase = QueuePhase::Playing;
            id
        };

        let result = tokio::select! {
            result = self.inner.output.play(&item.clip) => result,
            _ = token.cancelled() => {
                self.inner.output.stop().await;
                debug!("Priority {} clip interrupted", item.priority);
                Ok(())
            }
            _ = shutdown.cancelled() => Ok(()),
        };
        if let Err(e) = result {
            warn!("Audio playback failed: {}", e);
        }
        item.clip.release();

        let mut state = self.lock();
        if state
            .playback
            .as_ref()
            .is_some_and(|current| current.id == playback_id)
        {
            state.playback = None;
        }
        state.settle();
    }

    /// Returns whether the output is usable
    async fn reconnect(&self) -> bool {
        self.lock().phase = QueuePhase::Reconnecting;
        warn!("Audio output {} disconnected, reconnecting", self.inner.output.name());
        match self.inner.output.connect().await {
            Ok(()) => {
                info!("Audio output {} reconnected", self.inner.output.name());
                true
            }
            Err(e) => {
                warn!(
                    "Reconnect failed: {}, retrying in {:?}",
                    e, self.inner.config.reconnect_delay
                );
                false
            }
        }
    }
}
