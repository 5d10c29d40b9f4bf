//! Collaborator interfaces
//!
//! The pipeline hands events to external collaborators through these traits:
//! - `TextGenerator` turns an advisory into spoken-style text
//! - `SpeechSynthesizer` turns text into a playable `AudioClip`
//! - `AudioOutput` plays clips on whatever voice channel is attached
//! - `LapRecorder` persists completed laps
//!
//! All of them may fail; callers recover locally and never propagate.

use crate::event::AdvisoryEvent;
use crate::model::{compound_name, track_name, CompetitorState};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Spoken-text generator
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the radio line for `event`. The brief from
    /// `AdvisoryEvent::prompt` carries the per-kind word/tone template.
    async fn generate(&self, event: &AdvisoryEvent) -> Result<String>;
}

/// Text-to-speech
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}

/// Voice output channel
#[async_trait]
pub trait AudioOutput: Send + Sync {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Connect, or do nothing when already connected
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Play a clip; resolves when playback has finished.
    ///
    /// The future may be dropped mid-playback, in which case `stop` is
    /// called before anything else is played.
    async fn play(&self, clip: &AudioClip) -> Result<()>;

    /// Halt the active playback resource. Safe to call when idle.
    async fn stop(&self);
}

/// Completed-lap persistence
#[async_trait]
pub trait LapRecorder: Send + Sync {
    async fn record(&self, lap: &LapRecord) -> Result<()>;
}

/// Playable audio handle.
///
/// A file-backed clip owns its file: it is deleted when the clip is released
/// or dropped, whether or not it was ever played.
#[derive(Debug)]
pub struct AudioClip {
    text: String,
    path: Option<PathBuf>,
    duration: Duration,
}

impl AudioClip {
    pub fn from_file(text: impl Into<String>, path: PathBuf, duration: Duration) -> Self {
        Self {
            text: text.into(),
            path: Some(path),
            duration,
        }
    }

    /// Clip with no backing file (console output, tests)
    pub fn text_only(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            path: None,
            duration,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Release held resources now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AudioClip {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove audio file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// One completed lap handed to the `LapRecorder`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub car_index: u8,
    pub account_id: Option<String>,
    pub driver: String,
    pub track: String,
    pub lap_number: u8,
    pub lap_time_ms: u32,
    pub sector1_ms: u32,
    pub sector2_ms: u32,
    pub sector3_ms: u32,
    pub compound: String,
    pub recorded_at: DateTime<Utc>,
}

impl LapRecord {
    /// Build from the state just after the lap rolled over
    pub fn completed(state: &CompetitorState, lap_number: u8) -> Self {
        let s1 = state.last_lap_sector1_ms;
        let s2 = state.last_lap_sector2_ms;
        let sector3_ms = state
            .last_lap_time_ms
            .checked_sub(s1 + s2)
            .filter(|_| s1 > 0 && s2 > 0)
            .unwrap_or(0);

        Self {
            car_index: state.car_index,
            account_id: state.account_id.clone(),
            driver: state.driver_name.clone(),
            track: track_name(state.track_id).to_string(),
            lap_number,
            lap_time_ms: state.last_lap_time_ms,
            sector1_ms: s1,
            sector2_ms: s2,
            sector3_ms,
            compound: compound_name(state.visual_compound).to_string(),
            recorded_at: Utc::now(),
        }
    }
}
