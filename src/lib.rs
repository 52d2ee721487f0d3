//! # DataPipe-RS: Staged Data-Loading Pipeline
//!
//! Rows are sliced into buffers and pushed through a chain of stages
//! (rename, project, filter, user plugins), each on its own worker, joined
//! by bounded connectors. Epoch boundaries travel in-band as EOE markers and
//! the stream ends with a single EOF.
//!
//! ## Architecture
//!
//! - **Pipeline**: buffers, connectors, the per-stage run loop and the driver
//! - **Config**: TOML/JSON pipeline description (runtime, source, stages)
//! - **Dataset**: in-memory rows and JSON-lines loading
//! - **Report**: JSON run summaries
//!
//! ## Example
//!
//! ```no_run
//! use datapipe_rs::config::RuntimeConfig;
//! use datapipe_rs::dataset::Dataset;
//! use datapipe_rs::pipeline::{DatasetSource, PipelineBuilder, RenameStage};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let runtime = RuntimeConfig::default();
//! let dataset = Arc::new(Dataset::load_json_lines("train.jsonl")?);
//! let rename = RenameStage::builder(&runtime)
//!     .in_columns(["image", "label"])
//!     .out_columns(["img", "lbl"])
//!     .build()?;
//!
//! let output = PipelineBuilder::new(runtime.clone())
//!     .source(DatasetSource::new(dataset, &runtime)?)
//!     .stage(rename)
//!     .build()?
//!     .run()?;
//! println!("{} rows", output.total_rows());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, RuntimeConfig, StageConfig};
pub use dataset::Dataset;
pub use error::{DataPipeError, Result};
pub use pipeline::{DataBuffer, Pipeline, PipelineBuilder, PipelineError};
pub use report::RunReport;
pub use types::{Row, Value};
