//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use datapipe_rs::pipeline::{BufferFlag, DataBuffer};
use std::time::Duration;

/// Upper bound for anything that should finish "promptly".
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Flag pattern of a buffer sequence.
pub fn flags(buffers: &[DataBuffer]) -> Vec<BufferFlag> {
    buffers.iter().map(|b| b.flag()).collect()
}

/// Run `f` on its own thread and fail the test if it does not return in
/// time. Used to turn a deadlock into a test failure instead of a hang.
pub fn within_timeout<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(test_timeout())
        .expect("operation did not complete in time (deadlock?)")
}
