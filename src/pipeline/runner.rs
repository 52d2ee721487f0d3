//! Per-stage run loop and control-signal protocol.
//!
//! Each stage runs on its own worker:
//! 1. Take the first buffer. A control marker here is a framing violation:
//!    a fresh marker of the same kind is still forwarded, then the stage fails.
//! 2. Data buffers are transformed and pushed, in order.
//! 3. EOE: run the epoch hook, push a *fresh* EOE, go `Idle`, keep pulling.
//! 4. EOF: run the EOF hook, push a *fresh* EOF, go `Draining`, stop.
//!
//! A failing transform pushes nothing for that buffer.

use crate::pipeline::buffer::{BufferFlag, DataBuffer};
use crate::pipeline::connector::Connector;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::stage::AnyStage;
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a running stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum StageState {
    /// Between epochs; no data pulled yet for the next one.
    #[default]
    Idle,
    /// Pulling, transforming and pushing data buffers.
    Running,
    /// EOF seen; the loop has terminated.
    Draining,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Idle => write!(f, "Idle"),
            StageState::Running => write!(f, "Running"),
            StageState::Draining => write!(f, "Draining"),
        }
    }
}

/// Counters reported by a stage after its loop ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub name: String,
    /// Data buffers pushed downstream.
    pub buffers: u64,
    /// Rows carried by those buffers.
    pub rows: u64,
    /// EOE markers forwarded.
    pub epochs: u64,
}

/// Drives one stage between its inbound and outbound connectors.
pub struct StageRunner {
    name: String,
    stage: AnyStage,
    input: Connector,
    output: Connector,
    state: StageState,
    summary: StageSummary,
}

impl StageRunner {
    pub fn new(stage: AnyStage, input: Connector, output: Connector) -> Self {
        let name = stage.name().to_string();
        Self::with_name(name, stage, input, output)
    }

    pub fn with_name(
        name: impl Into<String>,
        stage: AnyStage,
        input: Connector,
        output: Connector,
    ) -> Self {
        let name = name.into();
        Self {
            summary: StageSummary {
                name: name.clone(),
                ..StageSummary::default()
            },
            name,
            stage,
            input,
            output,
            state: StageState::Idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn summary(&self) -> &StageSummary {
        &self.summary
    }

    pub fn describe(&self) -> String {
        format!(
            "[{}] {} (out capacity {})",
            self.name,
            self.stage.describe(),
            self.output.capacity()
        )
    }

    /// Run until EOF, an error, or cancellation. Errors carry the stage name.
    pub fn run(&mut self) -> PipelineResult<StageSummary> {
        let span = tracing::info_span!("stage", name = %self.name);
        let _enter = span.enter();

        match self.run_loop() {
            Ok(()) => {
                tracing::info!(
                    "Stage finished: {} buffers, {} rows, {} epochs",
                    self.summary.buffers,
                    self.summary.rows,
                    self.summary.epochs
                );
                Ok(self.summary.clone())
            }
            Err(e) => {
                if e.is_cancelled() {
                    tracing::debug!("Stage cancelled in state {}", self.state);
                } else {
                    tracing::error!("Stage failed in state {}: {}", self.state, e);
                }
                Err(e.in_stage(self.name.clone()))
            }
        }
    }

    fn run_loop(&mut self) -> PipelineResult<()> {
        let first = self.input.take()?;
        if first.is_control() {
            let flag = first.flag();
            drop(first);
            self.output.put(DataBuffer::control(flag))?;
            return Err(PipelineError::ProtocolSequencing(format!(
                "first buffer received was {} before any data",
                flag
            )));
        }

        let mut buffer = first;
        loop {
            match buffer.flag() {
                BufferFlag::None => {
                    self.state = StageState::Running;
                    let out = self.stage.transform(buffer)?;
                    self.summary.buffers += 1;
                    self.summary.rows += out.num_rows() as u64;
                    tracing::debug!("Pushing buffer {} ({} rows)", out.id(), out.num_rows());
                    self.output.put(out)?;
                }
                BufferFlag::Eoe => {
                    tracing::info!("EOE received");
                    self.stage.on_epoch_end(self.summary.epochs)?;
                    self.output.put(DataBuffer::eoe())?;
                    self.state = StageState::Idle;
                    self.summary.epochs += 1;
                }
                BufferFlag::Eof => {
                    tracing::info!("EOF received");
                    self.stage.on_eof()?;
                    self.output.put(DataBuffer::eof())?;
                    self.state = StageState::Draining;
                    return Ok(());
                }
            }
            buffer = self.input.take()?;
        }
    }
}
