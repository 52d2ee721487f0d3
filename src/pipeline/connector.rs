//! Bounded FIFO queues between stages, plus the shared shutdown signal.
//!
//! A `Connector` wraps a bounded crossbeam channel. `put` blocks while the
//! queue is full and `take` blocks while it is empty; both also wake up when
//! the pipeline's [`CancellationToken`] fires, so a stage stuck behind a
//! stalled neighbour can still be torn down.

use crate::pipeline::buffer::DataBuffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shutdown signal observable at every connector blocking point.
///
/// Internally a zero-capacity channel nobody ever sends on: cancelling drops
/// the only sender, which disconnects every receiver clone at once.
#[derive(Clone)]
pub struct CancellationToken {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        let mut guard = match self.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.take().is_some() {
            tracing::debug!("Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver that becomes ready (disconnected) once cancelled.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Bounded single-producer/single-consumer queue of [`DataBuffer`]s.
///
/// Cloning yields another handle to the same queue; the pipeline hands one
/// clone to the producing stage and one to the consuming stage.
#[derive(Clone)]
pub struct Connector {
    tx: Sender<DataBuffer>,
    rx: Receiver<DataBuffer>,
    capacity: usize,
    cancel: CancellationToken,
}

impl Connector {
    /// Create a connector holding at most `capacity` buffers.
    pub fn new(capacity: usize, cancel: CancellationToken) -> PipelineResult<Self> {
        if capacity == 0 {
            return Err(PipelineError::Configuration(
                "connector capacity must be at least 1".to_string(),
            ));
        }
        let (tx, rx) = bounded(capacity);
        Ok(Self {
            tx,
            rx,
            capacity,
            cancel,
        })
    }

    /// Enqueue `buffer`, blocking while the queue is full.
    ///
    /// Returns [`PipelineError::Cancelled`] if shutdown fires first; the
    /// buffer is dropped in that case.
    pub fn put(&self, buffer: DataBuffer) -> PipelineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        select! {
            send(self.tx, buffer) -> res => res.map_err(|_| PipelineError::Cancelled),
            recv(self.cancel.signal()) -> _ => Err(PipelineError::Cancelled),
        }
    }

    /// Dequeue the oldest buffer, blocking while the queue is empty.
    pub fn take(&self) -> PipelineResult<DataBuffer> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        select! {
            recv(self.rx) -> res => res.map_err(|_| PipelineError::Cancelled),
            recv(self.cancel.signal()) -> _ => Err(PipelineError::Cancelled),
        }
    }

    /// Dequeue with an upper bound on the wait. `Ok(None)` on timeout.
    pub fn take_timeout(&self, timeout: Duration) -> PipelineResult<Option<DataBuffer>> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        select! {
            recv(self.rx) -> res => res.map(Some).map_err(|_| PipelineError::Cancelled),
            recv(self.cancel.signal()) -> _ => Err(PipelineError::Cancelled),
            default(timeout) => Ok(None),
        }
    }

    /// Non-blocking dequeue.
    pub fn try_take(&self) -> Option<DataBuffer> {
        self.rx.try_recv().ok()
    }

    /// Number of buffers currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.rx.is_full()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
