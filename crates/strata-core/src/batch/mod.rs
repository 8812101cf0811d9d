//! Parallel batch processing with cancellation and progress reporting.
//!
//! A [`BatchCoordinator`] runs a caller-supplied worker over a list of
//! paths on a fixed pool of scoped threads. Paths are handed out through
//! a shared queue; results are folded into a [`BatchResult`] under one
//! lock, and the optional [`ProgressSink`] is called under that same
//! lock, so progress callbacks never overlap.

use crate::error::Error;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Default number of worker threads
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Configuration for batch runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; values below 1 are treated as 1
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl BatchConfig {
    /// Sets the number of worker threads
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }
}

/// How a single unit of work ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The worker finished the unit
    Success,
    /// The worker rejected the unit
    Failed(String),
    /// The worker raised an error
    Error(String),
}

impl ItemOutcome {
    /// Tag used in the per-item log line
    pub fn label(&self) -> &'static str {
        match self {
            ItemOutcome::Success => "done",
            ItemOutcome::Failed(_) => "failed",
            ItemOutcome::Error(_) => "error",
        }
    }
}

impl<T, E: fmt::Display> From<std::result::Result<T, E>> for ItemOutcome {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(_) => ItemOutcome::Success,
            Err(e) => ItemOutcome::Error(e.to_string()),
        }
    }
}

/// Receives progress updates, one call per completed unit
pub trait ProgressSink: Sync {
    /// `percent` is in `[0, 100]`
    fn on_progress(&self, percent: f64, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(f64, &str) + Sync,
{
    fn on_progress(&self, percent: f64, message: &str) {
        self(percent, message)
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation; units already running finish normally
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag so the coordinator can run again
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Aggregate outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Number of input paths
    pub total: usize,
    /// Units that ended in [`ItemOutcome::Success`]
    pub succeeded: usize,
    /// Units that ended in failure or error
    pub failed: usize,
    /// Units never started because of cancellation
    pub skipped: usize,
    /// Whether the run was cancelled
    pub cancelled: bool,
    /// One `"path: reason"` line per failed unit, in completion order
    pub errors: Vec<String>,
}

impl BatchResult {
    /// Units that ran to completion
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record(&mut self, path: &Path, outcome: ItemOutcome) {
        let label = outcome.label();
        match outcome {
            ItemOutcome::Success => {
                debug!("{}: {}", path.display(), label);
                self.succeeded += 1;
            }
            ItemOutcome::Failed(reason) | ItemOutcome::Error(reason) => {
                let line = Error::batch_item(path, reason).to_string();
                warn!("{}: {}", label, line);
                self.failed += 1;
                self.errors.push(line);
            }
        }
    }
}

/// Runs a worker over many paths in parallel
#[derive(Debug, Clone, Default)]
pub struct BatchCoordinator {
    config: BatchConfig,
    cancel: CancelHandle,
}

impl BatchCoordinator {
    /// Creates a coordinator with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Handle that cancels runs of this coordinator from any thread
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Requests cancellation of the current run
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Processes `paths` with `worker` and returns the aggregate result
    ///
    /// The worker is called at most once per path. After cancellation no
    /// new unit starts; units already running are awaited. A panicking
    /// worker counts as an error for its unit. The cancel flag is sticky;
    /// call [`CancelHandle::reset`] before reusing a cancelled coordinator.
    pub fn run<W>(&self, paths: &[PathBuf], worker: W, sink: Option<&dyn ProgressSink>) -> BatchResult
    where
        W: Fn(&Path) -> ItemOutcome + Sync,
    {
        let total = paths.len();
        let state = Mutex::new(BatchResult {
            total,
            ..BatchResult::default()
        });
        if total == 0 {
            return state.into_inner();
        }

        let (tx, rx) = crossbeam_channel::unbounded::<&Path>();
        for path in paths {
            // The receiver is alive until the scope below ends
            let _ = tx.send(path.as_path());
        }
        drop(tx);

        let workers = self.config.concurrency.clamp(1, total);
        info!("Processing {} path(s) with {} worker(s)", total, workers);

        thread::scope(|scope| {
            for _ in 0..workers {
                let rx = rx.clone();
                let state = &state;
                let worker = &worker;
                let cancel = &self.cancel;
                scope.spawn(move || {
                    while !cancel.is_cancelled() {
                        let Ok(path) = rx.recv() else {
                            break;
                        };
                        if cancel.is_cancelled() {
                            break;
                        }

                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker(path)))
                            .unwrap_or_else(|_| ItemOutcome::Error("worker panicked".to_string()));

                        let mut result = state.lock();
                        result.record(path, outcome);
                        if let Some(sink) = sink {
                            let done = result.completed();
                            let percent = done as f64 / total as f64 * 100.0;
                            sink.on_progress(percent, &format!("Processed {}/{}", done, total));
                        }
                    }
                });
            }
        });

        let mut result = state.into_inner();
        result.cancelled = self.cancel.is_cancelled();
        result.skipped = total - result.completed();
        info!(
            "Batch finished: {} succeeded, {} failed, {} skipped",
            result.succeeded, result.failed, result.skipped
        );
        result
    }
}
