//! Lifecycle events published by a [`ProcessRunner`](crate::cli::ProcessRunner).
//!
//! Three independent broadcast channels carry the start marker, raw output
//! chunks, and the final result. Every subscriber sees every event sent after
//! it subscribed, in emission order.
//!
//! The output channel is bounded and lossy. A subscriber that falls more than
//! its capacity behind gets [`RecvError::Lagged`](broadcast::error::RecvError::Lagged)
//! and has lost the oldest chunks. The runner never blocks on slow
//! subscribers. `completed` is a separate channel and is not affected by
//! output lag, and the result's `stderr` holds the full stderr regardless.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Default capacity for the started and completed channels.
pub const DEFAULT_LIFECYCLE_CAPACITY: usize = 16;

/// Default capacity for the output channel, in chunks.
///
/// Subscribers further behind than this lose the oldest chunks.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 1024;

/// Marker event published when a process is started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliStarted;

/// Final result of a CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliResult {
    /// The fully joined invocation, e.g. `dvc exp run`.
    pub command: String,
    /// Exit code, absent when the process was killed by a signal or never ran.
    pub exit_code: Option<i32>,
    /// Everything the process wrote to stderr.
    pub stderr: String,
}

impl CliResult {
    /// Returns true if the process exited with code zero.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The three event streams a runner publishes to.
///
/// Cloning shares the underlying channels, so a clone handed to a runner and
/// a clone kept by an observer see the same events.
#[derive(Debug, Clone)]
pub struct CliEvents {
    started: broadcast::Sender<CliStarted>,
    output: broadcast::Sender<String>,
    completed: broadcast::Sender<CliResult>,
}

impl Default for CliEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl CliEvents {
    /// Create channels with the default capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LIFECYCLE_CAPACITY, DEFAULT_OUTPUT_CAPACITY)
    }

    /// Create channels with explicit capacities.
    ///
    /// # Panics
    ///
    /// Panics if either capacity is zero.
    #[must_use]
    pub fn with_capacity(lifecycle: usize, output: usize) -> Self {
        let (started, _) = broadcast::channel(lifecycle);
        let (output, _) = broadcast::channel(output);
        let (completed, _) = broadcast::channel(lifecycle);
        Self {
            started,
            output,
            completed,
        }
    }

    /// Subscribe to start markers.
    #[must_use]
    pub fn subscribe_started(&self) -> broadcast::Receiver<CliStarted> {
        self.started.subscribe()
    }

    /// Subscribe to raw output chunks (stdout and stderr interleaved).
    ///
    /// `recv` reports `Lagged(n)` when `n` chunks were dropped before this
    /// subscriber read them.
    #[must_use]
    pub fn subscribe_output(&self) -> broadcast::Receiver<String> {
        self.output.subscribe()
    }

    /// Subscribe to completion results.
    #[must_use]
    pub fn subscribe_completed(&self) -> broadcast::Receiver<CliResult> {
        self.completed.subscribe()
    }

    /// Output chunks as a stream.
    ///
    /// Chunks dropped because the subscriber lagged are skipped.
    pub fn output_stream(&self) -> impl futures_core::Stream<Item = String> + Unpin {
        BroadcastStream::new(self.output.subscribe()).filter_map(|chunk| match chunk {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                tracing::warn!(error = %e, "Output subscriber lagged");
                None
            }
        })
    }

    /// Completion results as a stream.
    pub fn completed_stream(&self) -> impl futures_core::Stream<Item = CliResult> + Unpin {
        BroadcastStream::new(self.completed.subscribe()).filter_map(Result::ok)
    }

    // Sends fail only when nobody is subscribed, which is not an error here.

    pub(crate) fn publish_started(&self) {
        let _ = self.started.send(CliStarted);
    }

    pub(crate) fn publish_output(&self, chunk: String) {
        let _ = self.output.send(chunk);
    }

    pub(crate) fn publish_completed(&self, result: CliResult) {
        let _ = self.completed.send(result);
    }
}
