//! Formatting helpers and run-summary logging.
//!
//! No pipeline stage prints directly; everything user-facing goes through
//! the `log` macros and these formatters. The binary installs
//! `env_logger`; library users bring their own logger.

use std::time::{Duration, Instant};

use crate::run_stats::RunSummary;

/// Formats a count with thousands separators.
///
/// # Examples
///
/// ```
/// use fqflow_lib::logging::format_count;
///
/// assert_eq!(format_count(999), "999");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a fraction (0.0-1.0) as a percentage.
///
/// # Examples
///
/// ```
/// use fqflow_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// assert_eq!(format_percent(1.0, 0), "100%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0, decimals = decimals)
}

/// Formats a duration as "45s", "2m 15s" or "1h 30m".
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let rest = secs % 60;
        if rest == 0 { format!("{mins}m") } else { format!("{mins}m {rest}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a throughput value as "12.34 MB/s".
#[must_use]
pub fn format_throughput(mb_per_s: f64) -> String {
    format!("{mb_per_s:.2} MB/s")
}

/// Logs the end-of-run summary at info level.
pub fn log_run_summary(summary: &RunSummary) {
    log::info!("Processing summary:");
    log::info!("  Batches: {}", format_count(summary.batches_in));
    log::info!("  Reads in: {}", format_count(summary.records_in));
    log::info!(
        "  Passed: {} ({})",
        format_count(summary.records_passed),
        format_percent(summary.pass_rate(), 2)
    );
    log::info!(
        "  Filtered: {} ({})",
        format_count(summary.records_filtered),
        format_percent(summary.filter_rate(), 2)
    );
    if summary.records_modified > 0 {
        log::info!("  Modified: {}", format_count(summary.records_modified));
    }
    if summary.records_errored > 0 {
        log::info!("  Errored: {}", format_count(summary.records_errored));
    }
    log::info!(
        "  Wall time: {} ({})",
        format_duration(summary.elapsed),
        format_throughput(summary.throughput_mb_per_s())
    );
    let pool_total = summary.pool.hits + summary.pool.misses;
    if pool_total > 0 {
        log::info!(
            "  Batch pool: {} acquires, hit rate {}",
            format_count(pool_total),
            format_percent(summary.pool.hit_rate(), 2)
        );
    }
}

/// Logs an operation's start and, on completion, its item count and
/// elapsed time.
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    /// Starts the timer and logs the operation name.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start: Instant::now() }
    }

    /// Elapsed time since the timer was started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Logs the completion line with a record count.
    pub fn log_completion(&self, records: u64) {
        log::info!(
            "{} completed: {} reads in {}",
            self.operation,
            format_count(records),
            format_duration(self.start.elapsed())
        );
    }
}
