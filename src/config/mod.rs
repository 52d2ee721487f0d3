//! Configuration module for DataPipe-RS
//!
//! A pipeline run is described by one [`AppConfig`] file:
//! - `runtime`: connector capacity, rows per buffer, epoch count
//! - `logging`: filter directives and an optional log file
//! - `source`: the dataset (JSON-lines file or inline rows)
//! - `stages`: the ordered stage list
//!
//! TOML and JSON are both accepted; the format is picked from the file
//! extension (`.json` is JSON, anything else is TOML).
//!
//! # Default location
//!
//! - **Linux**: `~/.config/dev.hxyulin.datapipe-rs/pipeline.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.datapipe-rs/pipeline.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.datapipe-rs\pipeline.toml`
//!
//! # Example
//!
//! ```toml
//! [runtime]
//! connector_capacity = 8
//!
//! [source]
//! path = "train.jsonl"
//!
//! [[stages]]
//! kind = "rename"
//! in_columns = ["image", "label"]
//! out_columns = ["img", "lbl"]
//! ```

use crate::dataset::Dataset;
use crate::error::{DataPipeError, Result, ResultExt};
use crate::pipeline::stages::{FilterPredicate, FilterStage, ProjectStage, RenameStage};
use crate::pipeline::{
    AnyStage, DatasetSource, Pipeline, PipelineBuilder, PipelineError, PipelineResult,
};
use crate::types::{Row, Value};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.datapipe-rs";

/// Default config filename
pub const CONFIG_FILE: &str = "pipeline.toml";

/// Default bound of every connector
pub const DEFAULT_CONNECTOR_CAPACITY: usize = 16;

/// Default number of rows sliced into one buffer by a dataset source
pub const DEFAULT_ROWS_PER_BUFFER: usize = 32;

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,datapipe_rs=debug";

// ==================== Config Directory ====================

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Runtime Configuration ====================

/// Settings shared by every connector and source of one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum buffers held by a connector before `put` blocks
    pub connector_capacity: usize,

    /// Rows per data buffer produced by a dataset source
    pub rows_per_buffer: usize,

    /// Passes over the dataset; one EOE is emitted after each
    pub num_epochs: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            connector_capacity: DEFAULT_CONNECTOR_CAPACITY,
            rows_per_buffer: DEFAULT_ROWS_PER_BUFFER,
            num_epochs: 1,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connector_capacity == 0 {
            return Err(DataPipeError::Config(
                "runtime.connector_capacity must be at least 1".to_string(),
            ));
        }
        if self.rows_per_buffer == 0 {
            return Err(DataPipeError::Config(
                "runtime.rows_per_buffer must be at least 1".to_string(),
            ));
        }
        if self.num_epochs == 0 {
            return Err(DataPipeError::Config(
                "runtime.num_epochs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Logging Configuration ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,

    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            file: None,
        }
    }
}

// ==================== Source Configuration ====================

/// Where the rows come from.
///
/// With `path` set, the rows are read from a JSON-lines file; otherwise the
/// inline `columns` and `rows` are used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub path: Option<PathBuf>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl SourceConfig {
    pub fn to_dataset(&self) -> Result<Dataset> {
        match &self.path {
            Some(path) => Dataset::load_json_lines(path),
            None => Dataset::new(self.columns.clone(), self.rows.clone()),
        }
    }
}

// ==================== Stage Configuration ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    NotNull,
}

/// One entry of the `stages` list, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageConfig {
    Rename {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        in_columns: Vec<String>,
        out_columns: Vec<String>,
        /// Overrides `runtime.connector_capacity` for this stage's output
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connector_capacity: Option<usize>,
    },
    Project {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        columns: Vec<String>,
    },
    Filter {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        column: String,
        op: FilterOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl StageConfig {
    /// Explicit stage name, if one was configured.
    pub fn name(&self) -> Option<&str> {
        match self {
            StageConfig::Rename { name, .. }
            | StageConfig::Project { name, .. }
            | StageConfig::Filter { name, .. } => name.as_deref(),
        }
    }

    /// Construct the stage. All configuration errors surface here.
    pub fn build(&self, runtime: &RuntimeConfig) -> PipelineResult<AnyStage> {
        match self {
            StageConfig::Rename {
                in_columns,
                out_columns,
                connector_capacity,
                ..
            } => {
                let mut builder = RenameStage::builder(runtime)
                    .in_columns(in_columns.iter().cloned())
                    .out_columns(out_columns.iter().cloned());
                if let Some(capacity) = connector_capacity {
                    builder = builder.connector_capacity(*capacity);
                }
                Ok(builder.build()?.into())
            }
            StageConfig::Project { columns, .. } => Ok(ProjectStage::new(columns.clone())?.into()),
            StageConfig::Filter {
                column, op, value, ..
            } => {
                let predicate = match (op, value) {
                    (FilterOp::NotNull, _) => FilterPredicate::NotNull,
                    (FilterOp::Equals, Some(v)) => FilterPredicate::Equals(v.clone()),
                    (FilterOp::NotEquals, Some(v)) => FilterPredicate::NotEquals(v.clone()),
                    (_, None) => {
                        return Err(PipelineError::Configuration(format!(
                            "filter on '{}': op {:?} requires a value",
                            column, op
                        )))
                    }
                };
                Ok(FilterStage::new(column.clone(), predicate)?.into())
            }
        }
    }
}

// ==================== App Configuration ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    pub stages: Vec<StageConfig>,
}

impl AppConfig {
    /// Load a config file. Relative `source.path` / `logging.file` entries
    /// are resolved against the config file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataPipeError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config: AppConfig = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                DataPipeError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                DataPipeError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to `path`, creating parent directories as needed.
    ///
    /// TOML has no null, so a config holding `Value::Null` (in inline rows or
    /// a filter value) can only be saved as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| {
                DataPipeError::Serialization(format!("Failed to serialize config: {}", e))
            })?
        } else {
            if let Some(location) = self.first_null() {
                return Err(DataPipeError::Serialization(format!(
                    "Cannot write {} as TOML: {} is null; save as .json instead",
                    path.display(),
                    location
                )));
            }
            toml::to_string_pretty(self).map_err(|e| {
                DataPipeError::Serialization(format!("Failed to serialize config: {}", e))
            })?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).map_err(|e| {
            DataPipeError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Location of the first null value, if any.
    fn first_null(&self) -> Option<String> {
        for (r, row) in self.source.rows.iter().enumerate() {
            if let Some(c) = row.iter().position(Value::is_null) {
                return Some(format!("source.rows[{}][{}]", r, c));
            }
        }
        self.stages.iter().enumerate().find_map(|(i, stage)| match stage {
            StageConfig::Filter {
                value: Some(Value::Null),
                ..
            } => Some(format!("stages[{}].value", i)),
            _ => None,
        })
    }

    /// Check runtime bounds and construct every stage once, without
    /// starting anything.
    pub fn validate(&self) -> Result<()> {
        self.runtime.validate()?;
        for (i, stage) in self.stages.iter().enumerate() {
            stage
                .build(&self.runtime)
                .with_context(|| format!("stages[{}]", i))?;
        }
        Ok(())
    }

    /// Assemble the configured pipeline, loading the dataset.
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        self.validate()?;
        let dataset = Arc::new(self.source.to_dataset().context("Failed to load source")?);
        let mut builder = PipelineBuilder::new(self.runtime.clone())
            .source(DatasetSource::new(dataset, &self.runtime)?);
        for stage in &self.stages {
            let built = stage.build(&self.runtime)?;
            builder = match stage.name() {
                Some(name) => builder.named_stage(name, built),
                None => builder.stage(built),
            };
        }
        Ok(builder.build()?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let Some(p) = self.source.path.as_mut() {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
        if let Some(p) = self.logging.file.as_mut() {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}
