//! Staged data-loading pipeline.
//!
//! Buffers of rows flow from a source through a chain of stages. Each stage
//! runs on its own worker and is connected to its neighbours by a bounded
//! [`Connector`]; a full connector blocks the producer, an empty one blocks
//! the consumer.
//!
//! # Architecture
//!
//! ```text
//! [DatasetSource] ──► C0 ──► [Rename] ──► C1 ──► [Filter] ──► C2 ──► caller
//! ```
//!
//! # Framing
//!
//! The stream is a sequence of data buffers separated by control markers:
//! an EOE after every epoch and exactly one EOF at the end. Stages never
//! forward a marker they received; they push a fresh one of the same kind.
//!
//! # Design
//!
//! - **Enum dispatch on hot path**: `BuiltinStage` enum for all built-in stages.
//! - **Plugins**: anything else implements `StagePlugin` behind `AnyStage::Plugin`.
//! - **One worker per stage**: spawned through `WorkerSpawner`, OS threads by default.
//! - **Shared cancellation**: one token per pipeline unblocks every `put`/`take`.

pub mod buffer;
pub mod connector;
pub mod error;
pub mod executor;
pub mod runner;
pub mod source;
pub mod stage;
pub mod stages;

pub use buffer::{BufferFlag, ColumnMap, DataBuffer};
pub use connector::{CancellationToken, Connector};
pub use error::{PipelineError, PipelineResult};
pub use executor::{
    Pipeline, PipelineBuilder, PipelineOutput, RunningPipeline, ThreadSpawner, WorkerHandle,
    WorkerSpawner, WorkerTask,
};
pub use runner::{StageRunner, StageState, StageSummary};
pub use source::{BufferSource, DatasetSource, Source, SourceOutput};
pub use stage::{AnyStage, BuiltinStage, StagePlugin};
pub use stages::{FilterPredicate, FilterStage, ProjectStage, RenameStage, RenameStageBuilder};
