//! Bounded, order-preserving pipelines over a parallel middle stage.
//!
//! Both pipelines share the same shape:
//!
//! ```text
//! S1 parse (serial) ──> S2 transform/tally (parallel) ──> S3 sink/fold (serial)
//!       │                                                        │
//!       └──────────────── token returned ◄───────────────────────┘
//! ```
//!
//! - S1 assigns strictly increasing batch serials and may block on the
//!   batch pool, the source, or token exhaustion (the only backpressure).
//! - S2 runs on `worker_count` threads; batches complete in any order.
//! - S3 consumes in serial order via a reorder buffer, so output order
//!   equals input order exactly.
//!
//! Failure handling is drain-based, not unwound: the first fatal error
//! wins a shared failure slot, S1 stops producing, the stages drain what
//! they already hold (batches still return to the pool), and `run`
//! returns that first error.

mod processing;
mod sequencer;
mod statistics;
mod tokens;

pub use processing::ProcessingPipeline;
pub use sequencer::BatchSequencer;
pub use statistics::{StatisticsOutcome, StatisticsPipeline};
pub use tokens::{Token, TokenPool};

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::errors::FqflowError;

/// Cooperative cancellation handle.
///
/// Cancelling behaves as a synthetic end-of-stream at the parse stage:
/// batches already in flight drain normally and `run` returns success
/// with the counters accumulated so far.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    /// Creates a flag in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Shared slot that keeps the first fatal error and flips the pipeline
/// into aborting mode. Later errors are logged and discarded.
pub(crate) struct FailureSlot {
    aborting: AtomicBool,
    error: Mutex<Option<FqflowError>>,
}

impl FailureSlot {
    pub(crate) fn new() -> Self {
        Self { aborting: AtomicBool::new(false), error: Mutex::new(None) }
    }

    /// Records a fatal error; the first one wins.
    pub(crate) fn set(&self, error: FqflowError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            log::error!("Pipeline aborting: {error}");
            *slot = Some(error);
        } else {
            log::debug!("Suppressing subsequent pipeline error: {error}");
        }
        self.aborting.store(true, Ordering::Release);
    }

    pub(crate) fn is_aborting(&self) -> bool {
        self.aborting.load(Ordering::Acquire)
    }

    pub(crate) fn aborting_flag(&self) -> &AtomicBool {
        &self.aborting
    }

    /// Takes the stored error, leaving the slot empty.
    pub(crate) fn take(&self) -> Option<FqflowError> {
        self.error.lock().take()
    }
}
