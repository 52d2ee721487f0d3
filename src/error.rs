//! Error handling for datapipe-rs
//!
//! Pipeline internals report [`PipelineError`]; everything around them
//! (configuration files, dataset loading, reports) reports [`DataPipeError`].

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for datapipe-rs operations
#[derive(Error, Debug)]
pub enum DataPipeError {
    /// A stage or connector failed while the pipeline was running
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed dataset contents
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DataPipeError>,
    },
}

impl DataPipeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DataPipeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The pipeline error underneath any context layers, if there is one.
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        match self {
            DataPipeError::Pipeline(e) => Some(e),
            DataPipeError::WithContext { source, .. } => source.pipeline_error(),
            _ => None,
        }
    }
}

/// Result type alias for datapipe-rs operations
pub type Result<T> = std::result::Result<T, DataPipeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| DataPipeError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| DataPipeError::from(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DataPipeError::Dataset("row 3 has 1 fields, expected 2".to_string());
        assert_eq!(err.to_string(), "Dataset error: row 3 has 1 fields, expected 2");
    }

    #[test]
    fn test_error_with_context() {
        let err = DataPipeError::Config("bad".to_string());
        let with_ctx = err.with_context("Failed to load pipeline.toml");
        assert!(with_ctx.to_string().contains("Failed to load pipeline.toml"));
        assert!(with_ctx.pipeline_error().is_none());
    }

    #[test]
    fn test_pipeline_error_context() {
        let result: std::result::Result<(), PipelineError> =
            Err(PipelineError::Cancelled);
        let err = result.context("running pipeline").unwrap_err();
        assert!(err.to_string().starts_with("running pipeline"));
        assert!(matches!(err.pipeline_error(), Some(PipelineError::Cancelled)));
    }
}
