//! Structured per-run logging.
//!
//! Every pipeline run, successful or not, is recorded as one entry in a
//! bounded in-memory buffer and optionally appended as a JSONL line.

use crate::error::Result;
use crate::pipeline::PipelineOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub question: String,
    pub sql_query: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub rows_returned: u64,
    pub elapsed_ms: u64,
}

impl RunLogEntry {
    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id: Uuid::new_v4().to_string(),
            question: outcome.question.clone(),
            sql_query: outcome.sql_query.clone(),
            success: outcome.error.is_none(),
            error_message: outcome.error.clone(),
            rows_returned: outcome.results.len() as u64,
            elapsed_ms: outcome.elapsed_ms,
        }
    }
}

pub struct RunLog {
    log_file: Option<PathBuf>,
    entries: Mutex<Vec<RunLogEntry>>,
    max_in_memory: usize,
}

impl RunLog {
    pub fn new(log_file: Option<PathBuf>, max_in_memory: usize) -> Self {
        Self {
            log_file,
            entries: Mutex::new(Vec::new()),
            max_in_memory,
        }
    }

    /// Record a run. The oldest entry is evicted once the in-memory buffer
    /// is full; the file, when configured, keeps everything.
    pub fn record(&self, entry: RunLogEntry) -> Result<()> {
        {
            let mut entries = self.entries.lock().unwrap();
            entries.push(entry.clone());
            if entries.len() > self.max_in_memory {
                entries.remove(0);
            }
        }

        if self.log_file.is_some() {
            self.append_to_file(&entry)?;
        }

        Ok(())
    }

    fn append_to_file(&self, entry: &RunLogEntry) -> Result<()> {
        if let Some(ref log_file) = self.log_file {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)?;

            let json = serde_json::to_string(entry)?;
            writeln!(file, "{}", json)?;
        }

        Ok(())
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Vec<RunLogEntry> {
        let entries = self.entries.lock().unwrap();
        entries.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new(None, 1000)
    }
}
