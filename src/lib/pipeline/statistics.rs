//! The statistics pipeline.
//!
//! Shares the parse stage and batch pool with the processing pipeline but
//! replaces the transform with a pure per-batch tally and the sink with a
//! serial in-order fold into one global [`PositionStats`]. The fold is a
//! commutative monoid, so folding in serial order is merely a convenient
//! deterministic choice; any order would produce the same accumulator.
//!
//! The tally worker is the last stage that needs the batch itself, so it
//! returns the batch to the pool immediately and sends only the partial
//! accumulator onward; the escort token still travels to the fold stage,
//! keeping in-flight work bounded by the token budget.
//!
//! Statistics require a fixed read length; the first record seen pins it
//! and any later deviation aborts the run with `VariableReadLength`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::config::PipelineConfig;
use crate::errors::{FqflowError, Result};
use crate::fastq_io::{FastqFileSource, FillStatus, RecordSource};
use crate::pool::BatchPool;
use crate::record::RecordBatch;
use crate::run_stats::{RunStats, RunSummary};
use crate::stats::PositionStats;

use super::sequencer::BatchSequencer;
use super::tokens::{Token, TokenPool};
use super::{CancelFlag, FailureSlot};

/// A batch on its way to the tally workers.
struct TallyWork {
    batch: RecordBatch,
    token: Token,
}

/// A per-batch accumulator on its way to the fold stage.
struct TallyResult {
    batch_id: u64,
    partial: PositionStats,
    token: Token,
}

/// Result of a statistics run: the folded accumulator plus run counters.
#[derive(Debug)]
pub struct StatisticsOutcome {
    /// The globally folded per-position accumulator.
    pub stats: PositionStats,
    /// Run counters and timings.
    pub summary: RunSummary,
}

/// The per-position statistics pipeline.
pub struct StatisticsPipeline {
    config: PipelineConfig,
    cancel: Arc<CancelFlag>,
}

impl StatisticsPipeline {
    /// Creates a statistics pipeline.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config, cancel: Arc::new(CancelFlag::new()) }
    }

    /// Handle for cooperative cancellation.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<CancelFlag> {
        Arc::clone(&self.cancel)
    }

    /// Runs against the input file named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for an invalid configuration and
    /// otherwise the first fatal pipeline error, if any.
    pub fn run(self) -> Result<StatisticsOutcome> {
        self.config.validate(false)?;
        if self.config.is_paired() {
            log::warn!("Statistics run on a single input; ignoring the mate path");
        }
        let source = Box::new(FastqFileSource::open(&self.config.input_path)?);
        self.run_with(source)
    }

    /// Runs against an injected source adapter.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for an invalid configuration and
    /// otherwise the first fatal pipeline error, if any.
    pub fn run_with(self, mut source: Box<dyn RecordSource>) -> Result<StatisticsOutcome> {
        self.config.validate(false)?;
        let StatisticsPipeline { config, cancel } = self;

        let start = Instant::now();
        let workers = config.effective_worker_count();
        let stats = Arc::new(RunStats::new(config.enable_statistics));
        let pool = Arc::new(BatchPool::new(
            config.pool_capacity,
            config.batch_size,
            false,
            config.enable_memory_pool,
        ));

        log::info!(
            "Starting statistics pipeline: batch_size={}, workers={workers}, token_budget={}",
            config.batch_size,
            config.token_budget
        );

        if workers <= 1 {
            return run_sequential(&config, &cancel, source, &pool, &stats, start);
        }

        let failure = Arc::new(FailureSlot::new());
        let tokens = Arc::new(TokenPool::new(config.token_budget));
        let (work_tx, work_rx) = bounded::<TallyWork>(config.token_budget);
        let (done_tx, done_rx) = bounded::<TallyResult>(config.token_budget);

        let fold_handle = {
            let done_rx = done_rx.clone();
            let tokens = Arc::clone(&tokens);
            let stats = Arc::clone(&stats);
            let failure = Arc::clone(&failure);
            thread::Builder::new()
                .name("fqflow-fold".to_string())
                .spawn(move || fold_stage(&done_rx, &tokens, &stats, &failure))
        };
        drop(done_rx);

        let fold_handle = match fold_handle {
            Ok(handle) => handle,
            Err(error) => {
                drop(work_tx);
                drop(done_tx);
                log::warn!(
                    "Could not spawn fold thread ({error}); falling back to sequential mode"
                );
                return run_sequential(&config, &cancel, source, &pool, &stats, start);
            }
        };

        let offset = config.phred_offset;
        let mut worker_handles = Vec::with_capacity(workers);
        let mut spawn_failure: Option<std::io::Error> = None;
        for i in 0..workers {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let stats = Arc::clone(&stats);
            let pool = Arc::clone(&pool);
            let tokens = Arc::clone(&tokens);
            let failure = Arc::clone(&failure);
            let spawned =
                thread::Builder::new().name(format!("fqflow-tally-{i}")).spawn(move || {
                    tally_worker(&work_rx, &done_tx, offset, &stats, &pool, &tokens, &failure);
                });
            match spawned {
                Ok(handle) => worker_handles.push(handle),
                Err(error) => {
                    spawn_failure = Some(error);
                    break;
                }
            }
        }
        drop(work_rx);
        drop(done_tx);

        if let Some(error) = spawn_failure {
            drop(work_tx);
            for handle in worker_handles {
                let _ = handle.join();
            }
            let _ = fold_handle.join();
            log::warn!(
                "Could not spawn tally workers ({error}); falling back to sequential mode"
            );
            return run_sequential(&config, &cancel, source, &pool, &stats, start);
        }

        parse_stage(
            source.as_mut(),
            &work_tx,
            &pool,
            &tokens,
            &stats,
            &failure,
            &cancel,
            config.batch_size,
        );
        drop(work_tx);

        for handle in worker_handles {
            if handle.join().is_err() {
                failure.set(FqflowError::WorkerPanic {
                    reason: "tally worker terminated abnormally".to_string(),
                });
            }
        }
        let global = match fold_handle.join() {
            Ok(global) => global,
            Err(_) => {
                failure.set(FqflowError::WorkerPanic {
                    reason: "fold stage terminated abnormally".to_string(),
                });
                PositionStats::new()
            }
        };

        if let Err(error) = source.close() {
            failure.set(error);
        }

        let summary = stats.finalise(start.elapsed(), source.bytes_read(), pool.stats());
        match failure.take() {
            Some(error) => Err(error),
            None => Ok(StatisticsOutcome { stats: global, summary }),
        }
    }
}

/// Tallies one batch into a fresh partial accumulator.
fn tally_batch(batch: &RecordBatch, offset: u8) -> Result<PositionStats> {
    let mut partial = PositionStats::new();
    for record in batch.records() {
        partial.observe(record, offset)?;
    }
    Ok(partial)
}

#[allow(clippy::too_many_arguments)]
fn parse_stage(
    source: &mut dyn RecordSource,
    work_tx: &Sender<TallyWork>,
    pool: &BatchPool,
    tokens: &TokenPool,
    stats: &RunStats,
    failure: &FailureSlot,
    cancel: &CancelFlag,
    batch_size: usize,
) {
    let mut next_id = 0u64;
    loop {
        if failure.is_aborting() || cancel.is_cancelled() {
            break;
        }
        let Some(token) = tokens.acquire(failure.aborting_flag()) else {
            break;
        };
        let mut batch = match pool.acquire() {
            Ok(batch) => batch,
            Err(_) => {
                tokens.release(token);
                break;
            }
        };
        let started = Instant::now();
        match source.fill(&mut batch, batch_size) {
            Ok(FillStatus::Filled(filled)) => {
                stats.add_parse_time(started.elapsed());
                batch.set_batch_id(next_id);
                next_id += 1;
                stats.add_batch(filled as u64);
                if let Err(send_error) = work_tx.send(TallyWork { batch, token }) {
                    let TallyWork { batch, token } = send_error.0;
                    pool.release(batch);
                    tokens.release(token);
                    break;
                }
            }
            Ok(FillStatus::Eof) => {
                pool.release(batch);
                tokens.release(token);
                break;
            }
            Err(error) => {
                failure.set(error);
                pool.release(batch);
                tokens.release(token);
                break;
            }
        }
    }
}

fn tally_worker(
    work_rx: &Receiver<TallyWork>,
    done_tx: &Sender<TallyResult>,
    offset: u8,
    stats: &RunStats,
    pool: &BatchPool,
    tokens: &TokenPool,
    failure: &FailureSlot,
) {
    while let Ok(TallyWork { batch, token }) = work_rx.recv() {
        let started = Instant::now();
        let batch_id = batch.batch_id().expect("batch reached the tally without a serial");
        let result = catch_unwind(AssertUnwindSafe(|| tally_batch(&batch, offset)));
        pool.release(batch);
        match result {
            Ok(Ok(partial)) => {
                stats.add_transform_time(started.elapsed());
                stats.add_transform_outcome(partial.total_reads(), 0, 0, 0);
                if let Err(send_error) =
                    done_tx.send(TallyResult { batch_id, partial, token })
                {
                    tokens.release(send_error.0.token);
                    break;
                }
            }
            Ok(Err(error)) => {
                failure.set(error);
                tokens.release(token);
            }
            Err(payload) => {
                let reason = match payload.downcast_ref::<String>() {
                    Some(s) => s.clone(),
                    None => "opaque panic payload".to_string(),
                };
                failure.set(FqflowError::WorkerPanic { reason });
                tokens.release(token);
            }
        }
    }
}

/// Serial in-order fold of partial accumulators into the global one.
fn fold_stage(
    done_rx: &Receiver<TallyResult>,
    tokens: &TokenPool,
    stats: &RunStats,
    failure: &FailureSlot,
) -> PositionStats {
    let mut sequencer: BatchSequencer<TallyResult> = BatchSequencer::new();
    let mut global = PositionStats::new();
    while let Ok(result) = done_rx.recv() {
        sequencer.insert(result.batch_id, result);
        while let Some(TallyResult { partial, token, .. }) = sequencer.pop_ready() {
            let started = Instant::now();
            if let Err(error) = global.merge(&partial) {
                failure.set(error);
            }
            stats.add_sink_time(started.elapsed());
            tokens.release(token);
        }
    }
    for TallyResult { token, .. } in sequencer.drain_all() {
        tokens.release(token);
    }
    global
}

/// Single-threaded statistics run: fill, tally straight into the global
/// accumulator, release.
fn run_sequential(
    config: &PipelineConfig,
    cancel: &CancelFlag,
    mut source: Box<dyn RecordSource>,
    pool: &BatchPool,
    stats: &RunStats,
    start: Instant,
) -> Result<StatisticsOutcome> {
    let mut global = PositionStats::new();
    let mut first_error: Option<FqflowError> = None;
    let mut next_id = 0u64;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let mut batch = match pool.acquire() {
            Ok(batch) => batch,
            Err(_) => break,
        };
        let started = Instant::now();
        match source.fill(&mut batch, config.batch_size) {
            Ok(FillStatus::Filled(filled)) => {
                stats.add_parse_time(started.elapsed());
                batch.set_batch_id(next_id);
                next_id += 1;
                stats.add_batch(filled as u64);

                let started = Instant::now();
                let result = tally_batch(&batch, config.phred_offset);
                pool.release(batch);
                match result {
                    Ok(partial) => {
                        stats.add_transform_time(started.elapsed());
                        stats.add_transform_outcome(partial.total_reads(), 0, 0, 0);
                        let started = Instant::now();
                        if let Err(error) = global.merge(&partial) {
                            first_error = Some(error);
                            break;
                        }
                        stats.add_sink_time(started.elapsed());
                    }
                    Err(error) => {
                        first_error = Some(error);
                        break;
                    }
                }
            }
            Ok(FillStatus::Eof) => {
                pool.release(batch);
                break;
            }
            Err(error) => {
                first_error = Some(error);
                pool.release(batch);
                break;
            }
        }
    }

    if let Err(error) = source.close() {
        first_error.get_or_insert(error);
    }

    let summary = stats.finalise(start.elapsed(), source.bytes_read(), pool.stats());
    match first_error {
        Some(error) => Err(error),
        None => Ok(StatisticsOutcome { stats: global, summary }),
    }
}
