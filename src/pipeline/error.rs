//! Pipeline-specific error types.

use thiserror::Error;

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid construction-time configuration. Never raised mid-stream.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A configured source column is missing from a buffer's column map.
    #[error("Column not found: {missing:?} ({found} of {expected} columns matched)")]
    ColumnNotFound {
        found: usize,
        expected: usize,
        missing: Vec<String>,
    },

    /// EOE/EOF framing was violated on an inbound connector.
    #[error("Protocol sequencing error: {0}")]
    ProtocolSequencing(String),

    /// A buffer or parameter object could not be allocated.
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Invalid column map: {0}")]
    InvalidColumnMap(String),

    /// The pipeline was shut down while a stage was blocked.
    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Worker for stage '{0}' panicked")]
    WorkerPanicked(String),

    /// Error raised inside a named stage.
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Attach the failing stage's name.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        match self {
            // Keep the innermost stage name.
            err @ PipelineError::Stage { .. } => err,
            other => PipelineError::Stage {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any stage context stripped.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), PipelineError::Cancelled)
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
