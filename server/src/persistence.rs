//! Recording of finished matches.
//!
//! Account storage lives outside the relay. When a match resolves, the
//! coordinator hands a [`MatchRecord`] to a [`MatchRecorder`]. Recording is
//! best effort: a failure is logged by the caller and never retried.

use log::info;
use serde::{Deserialize, Serialize};
use shared::{AccountId, SessionId};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to write match record: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode match record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("match store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub session_id: SessionId,
    pub winner_user_id: Option<AccountId>,
    pub loser_user_id: Option<AccountId>,
    pub winner_score: u64,
    pub loser_score: u64,
    /// Milliseconds since the Unix epoch
    pub finished_at: u64,
}

pub trait MatchRecorder: Send {
    fn record(&self, record: &MatchRecord) -> Result<(), RecordError>;
}

/// Only logs the outcome.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl MatchRecorder for LogRecorder {
    fn record(&self, record: &MatchRecord) -> Result<(), RecordError> {
        info!(
            "Match {} finished: winner {:?} ({}) beat {:?} ({})",
            record.session_id,
            record.winner_user_id,
            record.winner_score,
            record.loser_user_id,
            record.loser_score
        );
        Ok(())
    }
}

/// Appends one JSON object per finished match to a file.
#[derive(Debug)]
pub struct JsonLinesRecorder {
    path: PathBuf,
}

impl JsonLinesRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MatchRecorder for JsonLinesRecorder {
    fn record(&self, record: &MatchRecord) -> Result<(), RecordError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Keeps records in memory; clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    records: Arc<Mutex<Vec<MatchRecord>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MatchRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl MatchRecorder for MemoryRecorder {
    fn record(&self, record: &MatchRecord) -> Result<(), RecordError> {
        self.records
            .lock()
            .map_err(|e| RecordError::Unavailable(e.to_string()))?
            .push(record.clone());
        Ok(())
    }
}
