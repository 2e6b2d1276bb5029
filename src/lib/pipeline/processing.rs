//! The record processing pipeline.
//!
//! Three bounded stages: a serial parse stage that fills pooled batches
//! and assigns strictly increasing serials, a parallel transform stage
//! that runs the predicate and mutator chains, and a serial sink stage
//! that writes surviving records in serial order. A fixed token budget
//! escorts every batch from parse to sink completion and is the only
//! backpressure mechanism.
//!
//! With `worker_count <= 1` the same per-batch routine runs on a single
//! thread with no tokens or channels; the parallel path with one worker
//! and the sequential path produce byte-identical output. The sequential
//! path also serves as the recovery mode when worker threads cannot be
//! spawned: nothing has been produced at spawn time, so rerunning from
//! the start is safe.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

use crate::config::PipelineConfig;
use crate::errors::{FqflowError, Result};
use crate::fastq_io::{
    FastqFileSink, FastqFileSource, FillStatus, PairedFastqSource, RecordSink, RecordSource,
};
use crate::mutator::MutatorChain;
use crate::pool::BatchPool;
use crate::predicate::PredicateChain;
use crate::record::RecordBatch;
use crate::run_stats::{RunStats, RunSummary};

use super::sequencer::BatchSequencer;
use super::tokens::{Token, TokenPool};
use super::{CancelFlag, FailureSlot};

/// A batch travelling between stages together with its escort token.
struct Escorted {
    batch: RecordBatch,
    token: Token,
}

/// Per-batch transform counts, folded into [`RunStats`] once per batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BatchOutcome {
    passed: u64,
    filtered: u64,
    modified: u64,
    errored: u64,
}

/// The configurable processing pipeline.
///
/// Configure it, add predicate and mutator chains, then call
/// [`run`](Self::run) (opens the file adapters named in the config) or
/// [`run_with`](Self::run_with) (injected adapters).
pub struct ProcessingPipeline {
    config: PipelineConfig,
    predicates: PredicateChain,
    mutators: MutatorChain,
    cancel: Arc<CancelFlag>,
}

impl ProcessingPipeline {
    /// Creates a pipeline with empty chains.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            predicates: PredicateChain::new(),
            mutators: MutatorChain::new(),
            cancel: Arc::new(CancelFlag::new()),
        }
    }

    /// Appends a predicate to the chain.
    pub fn add_predicate(&mut self, predicate: Box<dyn crate::predicate::ReadPredicate>) {
        self.predicates.push(predicate);
    }

    /// Appends a mutator to the chain.
    pub fn add_mutator(&mut self, mutator: Box<dyn crate::mutator::ReadMutator>) {
        self.mutators.push(mutator);
    }

    /// Handle for cooperative cancellation; cancelling acts as a
    /// synthetic end-of-stream at the parse stage.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<CancelFlag> {
        Arc::clone(&self.cancel)
    }

    /// Runs against the files named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for an invalid configuration and
    /// otherwise the first fatal pipeline error, if any.
    pub fn run(self) -> Result<RunSummary> {
        self.config.validate(true)?;
        let source: Box<dyn RecordSource> = match &self.config.input_path_mate {
            Some(mate) => {
                Box::new(PairedFastqSource::open(&self.config.input_path, mate)?)
            }
            None => Box::new(FastqFileSource::open(&self.config.input_path)?),
        };
        let output = self.config.output_path.clone().expect("validated above");
        let sink: Box<dyn RecordSink> = Box::new(FastqFileSink::create(output)?);
        self.run_with(source, sink)
    }

    /// Runs against injected source and sink adapters.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for an invalid configuration and
    /// otherwise the first fatal pipeline error, if any.
    pub fn run_with(
        self,
        source: Box<dyn RecordSource>,
        sink: Box<dyn RecordSink>,
    ) -> Result<RunSummary> {
        self.config.validate(false)?;
        let ProcessingPipeline { config, predicates, mutators, cancel } = self;

        let start = Instant::now();
        let workers = config.effective_worker_count();
        let stats = Arc::new(RunStats::new(config.enable_statistics));
        let pool = Arc::new(BatchPool::new(
            config.pool_capacity,
            config.batch_size,
            config.is_paired(),
            config.enable_memory_pool,
        ));

        log::info!(
            "Starting processing pipeline: batch_size={}, workers={workers}, token_budget={}",
            config.batch_size,
            config.token_budget
        );

        if workers <= 1 {
            return run_sequential(
                &config, &predicates, &mutators, &cancel, source, sink, &pool, &stats, start,
            );
        }

        run_parallel(
            config, predicates, mutators, cancel, source, sink, pool, stats, start, workers,
        )
    }
}

/// Runs the predicate and mutator chains over one batch, leaving only the
/// survivors in it. Record order within the batch is preserved.
fn process_batch(
    batch: &mut RecordBatch,
    predicates: &PredicateChain,
    mutators: &MutatorChain,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    if batch.is_paired() {
        let records = batch.take_records();
        let mates = batch.take_mates();
        let mut kept = Vec::with_capacity(records.len());
        let mut kept_mates = Vec::with_capacity(mates.len());
        for (mut r1, mut r2) in records.into_iter().zip(mates) {
            if !predicates.accepts_pair(&r1, &r2) {
                outcome.filtered += 2;
                continue;
            }
            if !mutators.is_empty() {
                match mutators.apply_pair(&mut r1, &mut r2) {
                    Ok(()) => outcome.modified += 2,
                    Err(e) => {
                        outcome.errored += 2;
                        log::debug!(
                            "Dropping pair '{}': {e}",
                            String::from_utf8_lossy(r1.id())
                        );
                        continue;
                    }
                }
            }
            outcome.passed += 2;
            kept.push(r1);
            kept_mates.push(r2);
        }
        batch.set_pairs(kept, kept_mates);
    } else {
        let records = batch.take_records();
        let mut kept = Vec::with_capacity(records.len());
        for mut record in records {
            if !predicates.accepts(&record) {
                outcome.filtered += 1;
                continue;
            }
            if !mutators.is_empty() {
                match mutators.apply(&mut record) {
                    Ok(()) => outcome.modified += 1,
                    Err(e) => {
                        outcome.errored += 1;
                        log::debug!(
                            "Dropping read '{}': {e}",
                            String::from_utf8_lossy(record.id())
                        );
                        continue;
                    }
                }
            }
            outcome.passed += 1;
            kept.push(record);
        }
        batch.set_records(kept);
    }
    outcome
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

/// The serial parse stage: acquire token, acquire batch, fill, tag,
/// hand off. Runs on the caller's thread.
#[allow(clippy::too_many_arguments)]
fn parse_stage(
    source: &mut dyn RecordSource,
    work_tx: &Sender<Escorted>,
    pool: &BatchPool,
    tokens: &TokenPool,
    stats: &RunStats,
    failure: &FailureSlot,
    cancel: &CancelFlag,
    batch_size: usize,
    paired: bool,
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
            // Pool shutdown mid-run is a cooperative end-of-stream.
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
                let records = if paired { 2 * filled as u64 } else { filled as u64 };
                stats.add_batch(records);
                if let Err(send_error) = work_tx.send(Escorted { batch, token }) {
                    // Workers are gone; a failure was recorded by whoever
                    // tore them down.
                    let Escorted { batch, token } = send_error.0;
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

/// One transform worker: pull a batch, run the chains, ship it onward.
/// A panic inside the chains is contained per batch and recorded as the
/// run's fatal error; the batch and its token still return to their
/// pools so the drain cannot deadlock.
fn transform_worker(
    work_rx: &Receiver<Escorted>,
    done_tx: &Sender<Escorted>,
    predicates: &PredicateChain,
    mutators: &MutatorChain,
    stats: &RunStats,
    pool: &BatchPool,
    tokens: &TokenPool,
    failure: &FailureSlot,
) {
    while let Ok(Escorted { mut batch, token }) = work_rx.recv() {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| {
            process_batch(&mut batch, predicates, mutators)
        }));
        match result {
            Ok(outcome) => {
                stats.add_transform_time(started.elapsed());
                stats.add_transform_outcome(
                    outcome.passed,
                    outcome.filtered,
                    outcome.modified,
                    outcome.errored,
                );
                if let Err(send_error) = done_tx.send(Escorted { batch, token }) {
                    let Escorted { batch, token } = send_error.0;
                    pool.release(batch);
                    tokens.release(token);
                    break;
                }
            }
            Err(payload) => {
                failure.set(FqflowError::WorkerPanic { reason: panic_message(&*payload) });
                pool.release(batch);
                tokens.release(token);
            }
        }
    }
}

/// The serial sink stage: reorder completions by serial and write them.
/// Returns the sink so the caller can close it exactly once.
fn sink_stage(
    mut sink: Box<dyn RecordSink>,
    done_rx: &Receiver<Escorted>,
    pool: &BatchPool,
    tokens: &TokenPool,
    stats: &RunStats,
    failure: &FailureSlot,
) -> Box<dyn RecordSink> {
    let mut sequencer: BatchSequencer<Escorted> = BatchSequencer::new();
    let mut sink_failed = false;
    while let Ok(item) = done_rx.recv() {
        let id = item.batch.batch_id().expect("batch reached the sink without a serial");
        sequencer.insert(id, item);
        while let Some(Escorted { batch, token }) = sequencer.pop_ready() {
            // Batches already accepted keep flowing to disk even while
            // aborting on an upstream error, so the output stays an exact
            // prefix; only a failed sink stops writing.
            if !sink_failed {
                let started = Instant::now();
                match sink.write(&batch) {
                    Ok(()) => stats.add_sink_time(started.elapsed()),
                    Err(error) => {
                        sink_failed = true;
                        failure.set(error);
                    }
                }
            }
            pool.release(batch);
            tokens.release(token);
        }
    }
    // A batch lost to a worker panic leaves a gap; everything buffered
    // behind it is released unwritten to keep pool and token accounting
    // exact.
    for Escorted { batch, token } in sequencer.drain_all() {
        pool.release(batch);
        tokens.release(token);
    }
    sink
}

#[allow(clippy::too_many_arguments)]
fn run_parallel(
    config: PipelineConfig,
    predicates: PredicateChain,
    mutators: MutatorChain,
    cancel: Arc<CancelFlag>,
    mut source: Box<dyn RecordSource>,
    sink: Box<dyn RecordSink>,
    pool: Arc<BatchPool>,
    stats: Arc<RunStats>,
    start: Instant,
    workers: usize,
) -> Result<RunSummary> {
    let predicates = Arc::new(predicates);
    let mutators = Arc::new(mutators);
    let failure = Arc::new(FailureSlot::new());
    let tokens = Arc::new(TokenPool::new(config.token_budget));
    let (work_tx, work_rx) = bounded::<Escorted>(config.token_budget);
    let (done_tx, done_rx) = bounded::<Escorted>(config.token_budget);

    // The sink rides in a slot so it survives a failed thread spawn and
    // can be handed to the sequential fallback.
    let sink_slot = Arc::new(Mutex::new(Some(sink)));

    let sink_handle = {
        let sink_slot = Arc::clone(&sink_slot);
        let done_rx = done_rx.clone();
        let pool = Arc::clone(&pool);
        let tokens = Arc::clone(&tokens);
        let stats = Arc::clone(&stats);
        let failure = Arc::clone(&failure);
        thread::Builder::new().name("fqflow-sink".to_string()).spawn(move || {
            let sink = sink_slot.lock().take().expect("sink present at thread start");
            sink_stage(sink, &done_rx, &pool, &tokens, &stats, &failure)
        })
    };
    drop(done_rx);

    let mut worker_handles = Vec::with_capacity(workers);
    let mut spawn_failure: Option<std::io::Error> = None;
    if sink_handle.is_ok() {
        for i in 0..workers {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let predicates = Arc::clone(&predicates);
            let mutators = Arc::clone(&mutators);
            let stats = Arc::clone(&stats);
            let pool = Arc::clone(&pool);
            let tokens = Arc::clone(&tokens);
            let failure = Arc::clone(&failure);
            let spawned =
                thread::Builder::new().name(format!("fqflow-transform-{i}")).spawn(move || {
                    transform_worker(
                        &work_rx, &done_tx, &predicates, &mutators, &stats, &pool, &tokens,
                        &failure,
                    );
                });
            match spawned {
                Ok(handle) => worker_handles.push(handle),
                Err(error) => {
                    spawn_failure = Some(error);
                    break;
                }
            }
        }
    }
    drop(work_rx);
    drop(done_tx);

    let sink_handle = match sink_handle {
        Ok(handle) => handle,
        Err(error) => {
            // Nothing was spawned; recover the sink and fall back.
            drop(work_tx);
            let sink = sink_slot.lock().take().expect("sink never left the slot");
            log::warn!("Could not spawn sink thread ({error}); falling back to sequential mode");
            return run_sequential(
                &config, &predicates, &mutators, &cancel, source, sink, &pool, &stats, start,
            );
        }
    };

    if let Some(error) = spawn_failure {
        // Tear down the partial crew. No work was produced yet, so the
        // sequential rerun starts from a clean slate and produces
        // bit-identical output.
        drop(work_tx);
        for handle in worker_handles {
            let _ = handle.join();
        }
        let sink = match sink_handle.join() {
            Ok(sink) => sink,
            Err(_) => {
                return Err(FqflowError::WorkerSpawn { reason: error.to_string() });
            }
        };
        log::warn!("Could not spawn transform workers ({error}); falling back to sequential mode");
        return run_sequential(
            &config, &predicates, &mutators, &cancel, source, sink, &pool, &stats, start,
        );
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
        config.is_paired(),
    );
    drop(work_tx);

    for handle in worker_handles {
        if handle.join().is_err() {
            failure.set(FqflowError::WorkerPanic {
                reason: "transform worker terminated abnormally".to_string(),
            });
        }
    }

    let sink = match sink_handle.join() {
        Ok(sink) => Some(sink),
        Err(_) => {
            failure.set(FqflowError::WorkerPanic {
                reason: "sink stage terminated abnormally".to_string(),
            });
            None
        }
    };

    if let Err(error) = source.close() {
        failure.set(error);
    }
    if let Some(mut sink) = sink {
        if let Err(error) = sink.close() {
            failure.set(error);
        }
    }

    let summary = stats.finalise(start.elapsed(), source.bytes_read(), pool.stats());
    match failure.take() {
        Some(error) => Err(error),
        None => Ok(summary),
    }
}

/// Single-threaded equivalent of the three-stage pipeline: one batch in
/// flight, no tokens, same per-batch routine and write order.
#[allow(clippy::too_many_arguments)]
fn run_sequential(
    config: &PipelineConfig,
    predicates: &PredicateChain,
    mutators: &MutatorChain,
    cancel: &CancelFlag,
    mut source: Box<dyn RecordSource>,
    mut sink: Box<dyn RecordSink>,
    pool: &BatchPool,
    stats: &RunStats,
    start: Instant,
) -> Result<RunSummary> {
    let paired = config.is_paired();
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
                stats.add_batch(if paired { 2 * filled as u64 } else { filled as u64 });

                let started = Instant::now();
                let outcome = process_batch(&mut batch, predicates, mutators);
                stats.add_transform_time(started.elapsed());
                stats.add_transform_outcome(
                    outcome.passed,
                    outcome.filtered,
                    outcome.modified,
                    outcome.errored,
                );

                let started = Instant::now();
                let write_result = sink.write(&batch);
                pool.release(batch);
                match write_result {
                    Ok(()) => stats.add_sink_time(started.elapsed()),
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
    if let Err(error) = sink.close() {
        first_error.get_or_insert(error);
    }

    let summary = stats.finalise(start.elapsed(), source.bytes_read(), pool.stats());
    match first_error {
        Some(error) => Err(error),
        None => Ok(summary),
    }
}
