//! Run counters and per-stage timers.
//!
//! Every counter is a lock-free fetch-add on a `u64`; stages update them
//! concurrently and readers may observe intermediate values, but values
//! are monotonically non-decreasing within a run. The per-stage timers
//! are non-essential and can be switched off via
//! `PipelineConfig::enable_statistics`; the record counters are always
//! maintained because the run summary depends on them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::pool::PoolStats;

/// Estimated bytes per record used for throughput when the source adapter
/// does not report bytes consumed.
pub const ESTIMATED_BYTES_PER_RECORD: u64 = 150;

/// Thread-safe run counters, zeroed at `run` start and finalised into a
/// [`RunSummary`] when the pipeline returns.
pub struct RunStats {
    batches_in: AtomicU64,
    records_in: AtomicU64,
    records_passed: AtomicU64,
    records_filtered: AtomicU64,
    records_modified: AtomicU64,
    records_errored: AtomicU64,
    parse_ns: AtomicU64,
    transform_ns: AtomicU64,
    sink_ns: AtomicU64,
    timers_enabled: bool,
}

impl RunStats {
    /// Creates zeroed stats. `timers_enabled` gates the per-stage timers
    /// only; counters are always live.
    #[must_use]
    pub fn new(timers_enabled: bool) -> Self {
        Self {
            batches_in: AtomicU64::new(0),
            records_in: AtomicU64::new(0),
            records_passed: AtomicU64::new(0),
            records_filtered: AtomicU64::new(0),
            records_modified: AtomicU64::new(0),
            records_errored: AtomicU64::new(0),
            parse_ns: AtomicU64::new(0),
            transform_ns: AtomicU64::new(0),
            sink_ns: AtomicU64::new(0),
            timers_enabled,
        }
    }

    /// Records one parsed batch of `records` records.
    pub fn add_batch(&self, records: u64) {
        self.batches_in.fetch_add(1, Ordering::Relaxed);
        self.records_in.fetch_add(records, Ordering::Relaxed);
    }

    /// Adds a transform stage outcome for one batch.
    pub fn add_transform_outcome(&self, passed: u64, filtered: u64, modified: u64, errored: u64) {
        self.records_passed.fetch_add(passed, Ordering::Relaxed);
        self.records_filtered.fetch_add(filtered, Ordering::Relaxed);
        self.records_modified.fetch_add(modified, Ordering::Relaxed);
        self.records_errored.fetch_add(errored, Ordering::Relaxed);
    }

    /// Accumulates time spent in the parse stage.
    pub fn add_parse_time(&self, elapsed: Duration) {
        if self.timers_enabled {
            self.parse_ns.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    /// Accumulates time spent in the transform stage.
    pub fn add_transform_time(&self, elapsed: Duration) {
        if self.timers_enabled {
            self.transform_ns.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    /// Accumulates time spent in the sink stage.
    pub fn add_sink_time(&self, elapsed: Duration) {
        if self.timers_enabled {
            self.sink_ns.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    /// Records seen so far.
    #[must_use]
    pub fn records_in(&self) -> u64 {
        self.records_in.load(Ordering::Relaxed)
    }

    /// Finalises the counters into a summary.
    #[must_use]
    pub fn finalise(
        &self,
        elapsed: Duration,
        bytes_read: Option<u64>,
        pool: PoolStats,
    ) -> RunSummary {
        RunSummary {
            batches_in: self.batches_in.load(Ordering::Relaxed),
            records_in: self.records_in.load(Ordering::Relaxed),
            records_passed: self.records_passed.load(Ordering::Relaxed),
            records_filtered: self.records_filtered.load(Ordering::Relaxed),
            records_modified: self.records_modified.load(Ordering::Relaxed),
            records_errored: self.records_errored.load(Ordering::Relaxed),
            parse_time: Duration::from_nanos(self.parse_ns.load(Ordering::Relaxed)),
            transform_time: Duration::from_nanos(self.transform_ns.load(Ordering::Relaxed)),
            sink_time: Duration::from_nanos(self.sink_ns.load(Ordering::Relaxed)),
            elapsed,
            bytes_read,
            pool,
        }
    }
}

/// Final counters of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Batches produced by the parse stage.
    pub batches_in: u64,
    /// Records read from the source.
    pub records_in: u64,
    /// Records that passed every predicate and mutator.
    pub records_passed: u64,
    /// Records rejected by a predicate.
    pub records_filtered: u64,
    /// Records rewritten by a non-empty mutator chain.
    pub records_modified: u64,
    /// Records dropped by a mutator failure.
    pub records_errored: u64,
    /// Accumulated parse stage time (zero when timers are disabled).
    pub parse_time: Duration,
    /// Accumulated transform stage time.
    pub transform_time: Duration,
    /// Accumulated sink stage time.
    pub sink_time: Duration,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Bytes consumed by the source adapter, when reported.
    pub bytes_read: Option<u64>,
    /// Batch pool counters at end of run.
    pub pool: PoolStats,
}

impl RunSummary {
    /// Fraction of input records that passed. Never divides by zero.
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        self.records_passed as f64 / self.records_in.max(1) as f64
    }

    /// Fraction of input records filtered out. Never divides by zero.
    #[must_use]
    pub fn filter_rate(&self) -> f64 {
        self.records_filtered as f64 / self.records_in.max(1) as f64
    }

    /// Throughput in MB/s, preferring bytes reported by the source and
    /// falling back to an estimated record size.
    #[must_use]
    pub fn throughput_mb_per_s(&self) -> f64 {
        let bytes = self
            .bytes_read
            .unwrap_or(self.records_in * ESTIMATED_BYTES_PER_RECORD) as f64;
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 { 0.0 } else { bytes / (1024.0 * 1024.0) / secs }
    }
}
