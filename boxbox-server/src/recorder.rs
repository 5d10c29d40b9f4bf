//! NDJSON lap log
//!
//! One JSON object per completed lap, appended to a single file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use boxbox_core::{LapRecord, LapRecorder};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub struct NdjsonLapRecorder {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl NdjsonLapRecorder {
    /// The file is created on the first record
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open lap log {}", self.path.display()))
    }
}

#[async_trait]
impl LapRecorder for NdjsonLapRecorder {
    async fn record(&self, lap: &LapRecord) -> Result<()> {
        let line = serde_json::to_string(lap)?;
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if file.is_none() {
            *file = Some(self.open()?);
        }
        if let Some(file) = file.as_mut() {
            writeln!(file, "{}", line)?;
        }
        debug!("Recorded lap {} for car {}", lap.lap_number, lap.car_index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxbox_core::CompetitorState;

    #[tokio::test]
    async fn test_appends_one_line_per_lap() {
        let dir = std::env::temp_dir().join(format!("boxbox-laps-{}", std::process::id()));
        let path = dir.join("laps.ndjson");
        let _ = std::fs::remove_file(&path);
        let recorder = NdjsonLapRecorder::new(&path);

        let mut state = CompetitorState::new(3);
        state.last_lap_time_ms = 91_234;
        recorder.record(&LapRecord::completed(&state, 1)).await.unwrap();
        state.last_lap_time_ms = 90_100;
        recorder.record(&LapRecord::completed(&state, 2)).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let laps: Vec<LapRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(laps.len(), 2);
        assert_eq!(laps[1].lap_number, 2);
        assert_eq!(laps[1].lap_time_ms, 90_100);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
