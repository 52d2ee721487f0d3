//! Stage abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`StagePlugin` trait**: for user-defined stages (map, batch, ...).
//! - **`BuiltinStage` enum**: for the built-in stages, dispatched by match.
//!
//! `AnyStage` wraps either variant so the runner handles both uniformly. The
//! runner only ever calls the per-buffer `transform` and the epoch hooks; it
//! never inspects which concrete stage it drives.

use crate::pipeline::buffer::DataBuffer;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stages::{FilterStage, ProjectStage, RenameStage};

/// Trait for pluggable/user-defined stages.
#[cfg_attr(test, mockall::automock)]
pub trait StagePlugin: Send {
    /// Human-readable name of this stage.
    fn name(&self) -> &str;

    /// Transform one data buffer. Never called with EOE/EOF markers.
    fn transform(&mut self, buffer: DataBuffer) -> PipelineResult<DataBuffer>;

    /// Called after an EOE has been received, before the fresh marker is
    /// pushed downstream.
    fn on_epoch_end(&mut self, _epoch: u64) -> PipelineResult<()> {
        Ok(())
    }

    /// Called once EOF has been received.
    fn on_eof(&mut self) -> PipelineResult<()> {
        Ok(())
    }

    /// Multi-line human-readable description of the stage configuration.
    fn describe(&self) -> String {
        self.name().to_string()
    }
}

/// Enum dispatch for built-in stages.
pub enum BuiltinStage {
    Rename(RenameStage),
    Project(ProjectStage),
    Filter(FilterStage),
}

impl BuiltinStage {
    pub fn name(&self) -> &str {
        match self {
            BuiltinStage::Rename(s) => s.name(),
            BuiltinStage::Project(s) => s.name(),
            BuiltinStage::Filter(s) => s.name(),
        }
    }

    pub fn transform(&mut self, buffer: DataBuffer) -> PipelineResult<DataBuffer> {
        match self {
            BuiltinStage::Rename(s) => s.transform(buffer),
            BuiltinStage::Project(s) => s.transform(buffer),
            BuiltinStage::Filter(s) => s.transform(buffer),
        }
    }

    pub fn on_epoch_end(&mut self, epoch: u64) -> PipelineResult<()> {
        match self {
            BuiltinStage::Rename(s) => s.on_epoch_end(epoch),
            BuiltinStage::Project(_) => Ok(()),
            BuiltinStage::Filter(s) => s.on_epoch_end(epoch),
        }
    }

    pub fn on_eof(&mut self) -> PipelineResult<()> {
        match self {
            BuiltinStage::Rename(s) => s.on_eof(),
            BuiltinStage::Project(_) | BuiltinStage::Filter(_) => Ok(()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            BuiltinStage::Rename(s) => s.describe(),
            BuiltinStage::Project(s) => s.describe(),
            BuiltinStage::Filter(s) => s.describe(),
        }
    }

    /// Per-stage override of the output connector capacity.
    pub fn connector_capacity(&self) -> Option<usize> {
        match self {
            BuiltinStage::Rename(s) => s.connector_capacity(),
            BuiltinStage::Project(_) | BuiltinStage::Filter(_) => None,
        }
    }
}

/// Wrapper that holds either a built-in stage or a plugin (trait object).
pub enum AnyStage {
    Builtin(BuiltinStage),
    Plugin(Box<dyn StagePlugin>),
}

impl AnyStage {
    pub fn name(&self) -> &str {
        match self {
            AnyStage::Builtin(s) => s.name(),
            AnyStage::Plugin(s) => s.name(),
        }
    }

    pub fn transform(&mut self, buffer: DataBuffer) -> PipelineResult<DataBuffer> {
        match self {
            AnyStage::Builtin(s) => s.transform(buffer),
            AnyStage::Plugin(s) => s.transform(buffer),
        }
    }

    pub fn on_epoch_end(&mut self, epoch: u64) -> PipelineResult<()> {
        match self {
            AnyStage::Builtin(s) => s.on_epoch_end(epoch),
            AnyStage::Plugin(s) => s.on_epoch_end(epoch),
        }
    }

    pub fn on_eof(&mut self) -> PipelineResult<()> {
        match self {
            AnyStage::Builtin(s) => s.on_eof(),
            AnyStage::Plugin(s) => s.on_eof(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AnyStage::Builtin(s) => s.describe(),
            AnyStage::Plugin(s) => s.describe(),
        }
    }

    pub fn connector_capacity(&self) -> Option<usize> {
        match self {
            AnyStage::Builtin(s) => s.connector_capacity(),
            AnyStage::Plugin(_) => None,
        }
    }
}

impl From<RenameStage> for AnyStage {
    fn from(stage: RenameStage) -> Self {
        AnyStage::Builtin(BuiltinStage::Rename(stage))
    }
}

impl From<ProjectStage> for AnyStage {
    fn from(stage: ProjectStage) -> Self {
        AnyStage::Builtin(BuiltinStage::Project(stage))
    }
}

impl From<FilterStage> for AnyStage {
    fn from(stage: FilterStage) -> Self {
        AnyStage::Builtin(BuiltinStage::Filter(stage))
    }
}

impl From<Box<dyn StagePlugin>> for AnyStage {
    fn from(stage: Box<dyn StagePlugin>) -> Self {
        AnyStage::Plugin(stage)
    }
}
