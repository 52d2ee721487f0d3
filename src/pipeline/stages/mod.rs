//! Built-in pipeline stage implementations.

pub mod filter;
pub mod project;
pub mod rename;

pub use filter::{FilterPredicate, FilterStage};
pub use project::ProjectStage;
pub use rename::{RenameStage, RenameStageBuilder};
