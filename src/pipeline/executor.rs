//! Pipeline assembly and execution.
//!
//! `PipelineBuilder` chains a source and a list of stages with one bounded
//! connector between each pair. `Pipeline::spawn` hands every stage loop to a
//! [`WorkerSpawner`]; the caller consumes the last connector.
//!
//! ```text
//! [Source] ──► C0 ──► [Stage 0] ──► C1 ──► [Stage 1] ──► C2 ──► caller
//! ```
//!
//! Any stage failure fires the shared cancellation token so that neighbours
//! blocked on a full or empty connector wake up. The error reported to the
//! caller is the most upstream failure that was not itself a cancellation.

use crate::config::RuntimeConfig;
use crate::pipeline::buffer::{BufferFlag, DataBuffer};
use crate::pipeline::connector::{CancellationToken, Connector};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::runner::{StageRunner, StageSummary};
use crate::pipeline::source::{Source, SourceOutput};
use crate::pipeline::stage::AnyStage;
use std::collections::HashSet;
use std::fmt::Write;
use std::thread::JoinHandle;

/// A unit of work handed to a [`WorkerSpawner`].
pub type WorkerTask = Box<dyn FnOnce() -> PipelineResult<StageSummary> + Send + 'static>;

/// The "run on a worker" capability the pipeline depends on.
pub trait WorkerSpawner {
    fn spawn(&self, name: &str, task: WorkerTask) -> PipelineResult<WorkerHandle>;
}

/// Handle to a spawned stage worker.
pub struct WorkerHandle {
    name: String,
    handle: JoinHandle<PipelineResult<StageSummary>>,
}

impl WorkerHandle {
    pub fn new(name: impl Into<String>, handle: JoinHandle<PipelineResult<StageSummary>>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the worker. A panic is reported as [`PipelineError::WorkerPanicked`].
    pub fn join(self) -> PipelineResult<StageSummary> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(PipelineError::WorkerPanicked(self.name)),
        }
    }
}

/// Default spawner: one named OS thread per stage.
#[derive(Debug, Clone, Default)]
pub struct ThreadSpawner {
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self, name: &str, task: WorkerTask) -> PipelineResult<WorkerHandle> {
        let mut builder = std::thread::Builder::new().name(format!("stage-{}", name));
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        let handle = builder.spawn(task).map_err(|e| {
            PipelineError::Resource(format!("failed to spawn worker for '{}': {}", name, e))
        })?;
        Ok(WorkerHandle::new(name, handle))
    }
}

/// Builder for a linear pipeline.
pub struct PipelineBuilder {
    runtime: RuntimeConfig,
    source: Option<Box<dyn Source>>,
    stages: Vec<(Option<String>, AnyStage)>,
}

impl PipelineBuilder {
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self {
            runtime,
            source: None,
            stages: Vec::new(),
        }
    }

    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn boxed_source(mut self, source: Box<dyn Source>) -> Self {
        self.source = Some(source);
        self
    }

    /// Append a stage, named after the stage kind.
    pub fn stage(mut self, stage: impl Into<AnyStage>) -> Self {
        self.stages.push((None, stage.into()));
        self
    }

    /// Append a stage under an explicit name (used in errors and logs).
    pub fn named_stage(mut self, name: impl Into<String>, stage: impl Into<AnyStage>) -> Self {
        self.stages.push((Some(name.into()), stage.into()));
        self
    }

    pub fn build(self) -> PipelineResult<Pipeline> {
        if self.runtime.connector_capacity == 0 {
            return Err(PipelineError::Configuration(
                "connector capacity must be at least 1".to_string(),
            ));
        }
        let source = self.source.ok_or_else(|| {
            PipelineError::Configuration("pipeline has no source".to_string())
        })?;

        let cancel = CancellationToken::new();
        let source_output = Connector::new(self.runtime.connector_capacity, cancel.clone())?;

        let mut used_names = HashSet::new();
        let mut runners = Vec::with_capacity(self.stages.len());
        let mut input = source_output.clone();
        for (name, stage) in self.stages {
            let base = name.unwrap_or_else(|| stage.name().to_string());
            let mut unique = base.clone();
            let mut n = 2;
            while !used_names.insert(unique.clone()) {
                unique = format!("{}#{}", base, n);
                n += 1;
            }

            let capacity = stage
                .connector_capacity()
                .unwrap_or(self.runtime.connector_capacity);
            let output = Connector::new(capacity, cancel.clone())
                .map_err(|e| e.in_stage(unique.clone()))?;
            runners.push(StageRunner::with_name(unique, stage, input, output.clone()));
            input = output;
        }

        tracing::info!(
            "Pipeline built: {} + {} stages, connector capacity {}",
            source.name(),
            runners.len(),
            self.runtime.connector_capacity
        );

        Ok(Pipeline {
            source,
            source_output,
            runners,
            output: input,
            cancel,
        })
    }
}

/// An assembled pipeline, ready to run.
pub struct Pipeline {
    source: Box<dyn Source>,
    source_output: Connector,
    runners: Vec<StageRunner>,
    output: Connector,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn stage_names(&self) -> Vec<&str> {
        self.runners.iter().map(|r| r.name()).collect()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Human-readable dump of the source, every stage and connector.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Pipeline ({} stages)", self.runners.len());
        let _ = writeln!(out, "[source] {}", self.source.describe());
        let _ = writeln!(out, "  -> connector capacity {}", self.source_output.capacity());
        for runner in &self.runners {
            let _ = writeln!(out, "{}", runner.describe());
        }
        out
    }

    /// Start every worker on `spawner`.
    pub fn spawn(self, spawner: &dyn WorkerSpawner) -> PipelineResult<RunningPipeline> {
        let Pipeline {
            mut source,
            source_output,
            runners,
            output,
            cancel,
        } = self;

        let mut running = RunningPipeline {
            workers: Vec::with_capacity(runners.len() + 1),
            output,
            cancel: cancel.clone(),
            eof_seen: false,
        };

        let source_name = source.name().to_string();
        let source_cancel = cancel.clone();
        let task: WorkerTask = Box::new(move || {
            let _guard = CancelOnPanic(source_cancel.clone());
            let mut output = SourceOutput::new(&source_output);
            let result = source
                .produce(&mut output)
                .and_then(|summary| output.finish().map(|()| summary))
                .map_err(|e| e.in_stage(source.name().to_string()));
            cancel_on_failure(&result, &source_cancel);
            result
        });
        running.push_worker(spawner.spawn(&source_name, task))?;

        for mut runner in runners {
            let name = runner.name().to_string();
            let stage_cancel = cancel.clone();
            let task: WorkerTask = Box::new(move || {
                let _guard = CancelOnPanic(stage_cancel.clone());
                let result = runner.run();
                cancel_on_failure(&result, &stage_cancel);
                result
            });
            running.push_worker(spawner.spawn(&name, task))?;
        }

        Ok(running)
    }

    /// Run to completion on OS threads and collect every output buffer.
    pub fn run(self) -> PipelineResult<PipelineOutput> {
        let mut running = self.spawn(&ThreadSpawner::new())?;
        let mut buffers = Vec::new();
        while let Some(buffer) = running.next_buffer()? {
            buffers.push(buffer);
        }
        let summaries = running.join()?;
        Ok(PipelineOutput { buffers, summaries })
    }
}

/// Fires the token if the worker unwinds, so neighbours blocked on a
/// connector see the failure.
struct CancelOnPanic(CancellationToken);

impl Drop for CancelOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("Worker panicked, cancelling pipeline");
            self.0.cancel();
        }
    }
}

fn cancel_on_failure(result: &PipelineResult<StageSummary>, cancel: &CancellationToken) {
    if let Err(e) = result {
        if !e.is_cancelled() {
            cancel.cancel();
        }
    }
}

/// A pipeline whose workers are live.
///
/// Dropping it cancels and joins any workers still running.
pub struct RunningPipeline {
    workers: Vec<WorkerHandle>,
    output: Connector,
    cancel: CancellationToken,
    eof_seen: bool,
}

impl RunningPipeline {
    fn push_worker(&mut self, handle: PipelineResult<WorkerHandle>) -> PipelineResult<()> {
        match handle {
            Ok(h) => {
                self.workers.push(h);
                Ok(())
            }
            Err(e) => {
                self.shutdown();
                Err(e)
            }
        }
    }

    /// Next buffer from the last connector, markers included.
    ///
    /// Returns `Ok(None)` once EOF has been delivered. If a stage fails, its
    /// error is returned here.
    pub fn next_buffer(&mut self) -> PipelineResult<Option<DataBuffer>> {
        if self.eof_seen {
            return Ok(None);
        }
        match self.output.take() {
            Ok(buffer) => {
                if buffer.is_eof() {
                    self.eof_seen = true;
                }
                Ok(Some(buffer))
            }
            Err(e) => Err(self.failure(e)),
        }
    }

    /// Connector the caller reads from.
    pub fn output(&self) -> &Connector {
        &self.output
    }

    /// Fire cancellation; blocked workers return [`PipelineError::Cancelled`].
    pub fn shutdown(&self) {
        tracing::info!("Pipeline shutdown requested");
        self.cancel.cancel();
    }

    /// Wait for all workers and return their summaries in pipeline order.
    pub fn join(mut self) -> PipelineResult<Vec<StageSummary>> {
        let results = self.join_workers();
        let mut summaries = Vec::with_capacity(results.len());
        let mut cancelled = None;
        for result in results {
            match result {
                Ok(summary) => summaries.push(summary),
                Err(e) if e.is_cancelled() => {
                    cancelled.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match cancelled {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }

    fn join_workers(&mut self) -> Vec<PipelineResult<StageSummary>> {
        std::mem::take(&mut self.workers)
            .into_iter()
            .map(WorkerHandle::join)
            .collect()
    }

    /// Cancel everything and pick the root-cause error.
    fn failure(&mut self, fallback: PipelineError) -> PipelineError {
        self.cancel.cancel();
        self.join_workers()
            .into_iter()
            .filter_map(Result::err)
            .find(|e| !e.is_cancelled())
            .unwrap_or(fallback)
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.cancel.cancel();
            let _ = self.join_workers();
        }
    }
}

/// Everything a completed run delivered to the caller.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Buffers in arrival order, ending with EOF.
    pub buffers: Vec<DataBuffer>,
    /// Source summary first, then one per stage.
    pub summaries: Vec<StageSummary>,
}

impl PipelineOutput {
    pub fn flags(&self) -> Vec<BufferFlag> {
        self.buffers.iter().map(|b| b.flag()).collect()
    }

    pub fn data_buffers(&self) -> impl Iterator<Item = &DataBuffer> {
        self.buffers.iter().filter(|b| !b.is_control())
    }

    pub fn total_rows(&self) -> usize {
        self.data_buffers().map(|b| b.num_rows()).sum()
    }
}
