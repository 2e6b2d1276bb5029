//! Bounded batch pool.
//!
//! The pool amortises batch allocation across a run and bounds the total
//! number of live batches. Batches are cleared on release, not on acquire,
//! so the acquire path is allocation-free in steady state.
//!
//! Invariants:
//! - `in_flight + free <= capacity` at every instant
//! - `hits` counts acquires served from the free list, `misses` counts
//!   acquires that allocated
//! - after `shutdown`, every waiting and future `acquire` fails with
//!   `PoolShutDown`

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::errors::{FqflowError, Result};
use crate::record::RecordBatch;

/// Snapshot of pool counters. Non-authoritative: values may move while the
/// snapshot is being read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Batches currently sitting in the free list.
    pub size: usize,
    /// Batches currently handed out to a stage.
    pub live: usize,
    /// Acquires served from the free list.
    pub hits: u64,
    /// Acquires that had to allocate.
    pub misses: u64,
}

impl PoolStats {
    /// Fraction of acquires served without allocating.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

struct PoolState {
    free: Vec<RecordBatch>,
    live: usize,
    shutdown: bool,
}

/// A bounded multiset of cleared batches shared by the pipeline stages.
pub struct BatchPool {
    state: Mutex<PoolState>,
    available: Condvar,
    capacity: usize,
    batch_capacity: usize,
    paired: bool,
    recycle: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BatchPool {
    /// Creates a pool holding at most `capacity` live batches, each sized
    /// for `batch_capacity` records. With `recycle` false, released
    /// batches are dropped instead of re-enqueued (every acquire
    /// allocates), which matches the "memory pool disabled" mode.
    #[must_use]
    pub fn new(capacity: usize, batch_capacity: usize, paired: bool, recycle: bool) -> Self {
        Self {
            state: Mutex::new(PoolState { free: Vec::new(), live: 0, shutdown: false }),
            available: Condvar::new(),
            capacity,
            batch_capacity,
            paired,
            recycle,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Hands out a cleared batch, allocating while the live count is under
    /// capacity and blocking otherwise until a release or shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`FqflowError::PoolShutDown`] if the pool was shut down
    /// before a batch became available.
    pub fn acquire(&self) -> Result<RecordBatch> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return Err(FqflowError::PoolShutDown);
            }
            if let Some(batch) = state.free.pop() {
                state.live += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(batch);
            }
            if state.live < self.capacity {
                state.live += 1;
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(RecordBatch::with_capacity(self.batch_capacity, self.paired));
            }
            self.available.wait(&mut state);
        }
    }

    /// Clears the batch and returns it to the free list (or drops it when
    /// recycling is disabled). Wakes one blocked `acquire`.
    pub fn release(&self, mut batch: RecordBatch) {
        batch.clear();
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
        if self.recycle && !state.shutdown {
            state.free.push(batch);
        }
        drop(state);
        self.available.notify_one();
    }

    /// Unblocks all waiters; subsequent acquires fail.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        state.free.clear();
        drop(state);
        self.available.notify_all();
    }

    /// Non-authoritative snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            size: state.free.len(),
            live: state.live,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
