//! JSONL attempt log: append-only record of every attempt and run outcome.
//!
//! Features:
//! - One JSON object per line for easy post-mortem parsing
//! - Rotation to `<name>.1` once the file exceeds `MAX_LOG_SIZE`

use crate::outcome::{AcquisitionOutcome, AttemptResult, FailureReason, Stage};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum log size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// A single log record.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AttemptEvent {
    Attempt {
        timestamp: String,
        run_id: String,
        attempt: u32,
        duration_ms: u64,
        result: &'static str,
        /// Pipeline stage that failed, when the failure belongs to one.
        stage: Option<Stage>,
        reason: Option<FailureReason>,
    },
    Outcome {
        timestamp: String,
        run_id: String,
        #[serde(flatten)]
        outcome: AcquisitionOutcome,
    },
}

/// Append-only JSONL writer scoped to one run.
pub struct AttemptLog {
    file: File,
    path: PathBuf,
    run_id: String,
    current_size: u64,
}

impl AttemptLog {
    /// Open or create the log file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = open_append(path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            run_id: uuid::Uuid::new_v4().to_string(),
            current_size,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record_attempt(
        &mut self,
        attempt: u32,
        duration_ms: u64,
        result: &AttemptResult,
    ) -> Result<()> {
        let event = AttemptEvent::Attempt {
            timestamp: Utc::now().to_rfc3339(),
            run_id: self.run_id.clone(),
            attempt,
            duration_ms,
            result: result.label(),
            stage: result.reason().and_then(FailureReason::stage),
            reason: result.reason().cloned(),
        };
        self.write(&event)
    }

    pub fn record_outcome(&mut self, outcome: &AcquisitionOutcome) -> Result<()> {
        let event = AttemptEvent::Outcome {
            timestamp: Utc::now().to_rfc3339(),
            run_id: self.run_id.clone(),
            outcome: outcome.clone(),
        };
        self.write(&event)
    }

    fn write(&mut self, event: &AttemptEvent) -> Result<()> {
        if self.current_size >= MAX_LOG_SIZE {
            self.rotate()?;
        }

        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .context("failed to write attempt log")?;
        self.file.flush()?;
        self.current_size += line.len() as u64;
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        let mut rotated = self.path.clone().into_os_string();
        rotated.push(".1");
        std::fs::rename(&self.path, &rotated)
            .with_context(|| format!("failed to rotate {}", self.path.display()))?;
        self.file = open_append(&self.path)?;
        self.current_size = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open attempt log: {}", path.display()))
}
