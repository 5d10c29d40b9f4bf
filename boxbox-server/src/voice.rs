//! Built-in collaborators
//!
//! Enough to run the whole pipeline with nothing external attached: the
//! generator speaks each trigger's fallback line, the synthesizer makes
//! file-less clips timed by word count, and the console output "plays" a clip
//! by logging it and waiting out its duration.

use anyhow::{bail, Result};
use async_trait::async_trait;
use boxbox_core::{AdvisoryEvent, AudioClip, AudioOutput, SpeechSynthesizer, TextGenerator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Typical radio delivery pace
const WORDS_PER_MINUTE: f32 = 170.0;
const MIN_CLIP_DURATION: Duration = Duration::from_millis(800);

pub struct FallbackGenerator;

#[async_trait]
impl TextGenerator for FallbackGenerator {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn generate(&self, event: &AdvisoryEvent) -> Result<String> {
        Ok(event.kind().fallback_line().to_string())
    }
}

pub struct TextOnlySynthesizer {
    words_per_minute: f32,
}

impl TextOnlySynthesizer {
    pub fn new() -> Self {
        Self {
            words_per_minute: WORDS_PER_MINUTE,
        }
    }

    /// Speaking time for `text` at this synthesizer's pace
    pub fn estimate_duration(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as f32;
        Duration::from_secs_f32(words * 60.0 / self.words_per_minute).max(MIN_CLIP_DURATION)
    }
}

impl Default for TextOnlySynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesizer for TextOnlySynthesizer {
    fn name(&self) -> &str {
        "text-only"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let text = text.trim();
        if text.is_empty() {
            bail!("nothing to say");
        }
        Ok(AudioClip::text_only(text, self.estimate_duration(text)))
    }
}

/// Logs each line as if it went out over the radio
pub struct ConsoleOutput {
    connected: AtomicBool,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
        }
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioOutput for ConsoleOutput {
    fn name(&self) -> &str {
        "console"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn play(&self, clip: &AudioClip) -> Result<()> {
        if !self.is_connected() {
            bail!("console output disconnected");
        }
        info!("Radio: {}", clip.text());
        tokio::time::sleep(clip.duration()).await;
        Ok(())
    }

    async fn stop(&self) {
        debug!("Console playback stopped");
    }
}
