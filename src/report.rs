//! Run reports.
//!
//! A [`RunReport`] records what one pipeline run did: when it started and
//! finished, how it ended, and the per-stage counters. It is written as
//! pretty JSON by the `--report` CLI flag.

use crate::error::{DataPipeError, Result};
use crate::pipeline::{PipelineError, PipelineOutput, StageSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Data buffers delivered to the caller
    pub buffers: u64,
    /// Rows delivered to the caller
    pub rows: u64,
    /// EOE markers delivered to the caller
    pub epochs: u64,
    pub stages: Vec<StageSummary>,
}

impl RunReport {
    /// Build a report from the result of [`Pipeline::run`].
    ///
    /// [`Pipeline::run`]: crate::pipeline::Pipeline::run
    pub fn from_result(
        started_at: DateTime<Utc>,
        result: &std::result::Result<PipelineOutput, PipelineError>,
    ) -> Self {
        let finished_at = Utc::now();
        match result {
            Ok(output) => Self {
                started_at,
                finished_at,
                outcome: RunOutcome::Completed,
                error: None,
                buffers: output.data_buffers().count() as u64,
                rows: output.total_rows() as u64,
                epochs: output.buffers.iter().filter(|b| b.is_eoe()).count() as u64,
                stages: output.summaries.clone(),
            },
            Err(e) => Self {
                started_at,
                finished_at,
                outcome: if e.is_cancelled() {
                    RunOutcome::Cancelled
                } else {
                    RunOutcome::Failed
                },
                error: Some(e.to_string()),
                buffers: 0,
                rows: 0,
                epochs: 0,
                stages: Vec::new(),
            },
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DataPipeError::Serialization(format!("Failed to serialize report: {}", e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }
}
