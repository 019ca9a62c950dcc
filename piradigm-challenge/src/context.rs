//! State shared by one challenge run's supervisor and pipeline threads

use piradigm_core::{CancelToken, StopReason};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Where a challenge run is in its life.
///
/// Moves forward only: `Initializing`, `Running`, `Stopping`, `Stopped`.
/// A run that fails to start skips `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Initializing,
            1 => Lifecycle::Running,
            2 => Lifecycle::Stopping,
            _ => Lifecycle::Stopped,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Lifecycle::Initializing => "initializing",
            Lifecycle::Running => "running",
            Lifecycle::Stopping => "stopping",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// Created per supervisor and cloned into each thread it starts
#[derive(Clone, Default, Debug)]
pub struct PipelineContext {
    cancel: CancelToken,
    counters: Arc<Counters>,
}

#[derive(Default, Debug)]
struct Counters {
    lifecycle: AtomicU8,
    finished: AtomicBool,
    processed: AtomicU64,
    handler_errors: AtomicU64,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn cancel(&self, reason: StopReason) -> bool {
        self.cancel.cancel(reason)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.counters.lifecycle.load(Ordering::Acquire))
    }

    /// Advance to `next` and return the previous state. Moving backwards is
    /// refused and leaves the state unchanged.
    pub(crate) fn advance(&self, next: Lifecycle) -> Lifecycle {
        let previous = self
            .counters
            .lifecycle
            .fetch_max(next as u8, Ordering::AcqRel);
        Lifecycle::from_u8(previous)
    }

    /// Raised by the processor when its handler reports completion
    pub fn mark_finished(&self) {
        self.counters.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.counters.finished.load(Ordering::Acquire)
    }

    pub(crate) fn record_processed(&self) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_error(&self) {
        self.counters.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_processed(&self) -> u64 {
        self.counters.processed.load(Ordering::Relaxed)
    }

    pub fn handler_errors(&self) -> u64 {
        self.counters.handler_errors.load(Ordering::Relaxed)
    }
}
