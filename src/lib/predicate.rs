//! Record predicates and their composition.
//!
//! A predicate inspects one record and votes to keep or drop it. Chains
//! evaluate as a short-circuit conjunction in list order: the first reject
//! wins and later predicates never see the record. Predicates must derive
//! their verdict from the record alone; the built-ins keep atomic
//! observation counters, but those never influence a verdict.
//!
//! Predicates run before mutators, so a record that is going to be dropped
//! never pays mutation cost.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{FqflowError, Result};
use crate::phred;
use crate::record::FastqRecord;

/// Per-record keep/drop vote. Implementations are invoked concurrently
/// from multiple transform workers on distinct records.
pub trait ReadPredicate: Send + Sync {
    /// Returns true to keep the record. Must not mutate it.
    fn evaluate(&self, record: &FastqRecord) -> bool;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Ordered list of predicates combined with short-circuit AND.
#[derive(Default)]
pub struct PredicateChain {
    predicates: Vec<Box<dyn ReadPredicate>>,
}

impl PredicateChain {
    /// Creates an empty chain, which accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a predicate; it runs after all previously added ones.
    pub fn push(&mut self, predicate: Box<dyn ReadPredicate>) {
        self.predicates.push(predicate);
    }

    /// Number of predicates in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// True iff every predicate accepts the record; stops at the first
    /// reject.
    #[must_use]
    pub fn accepts(&self, record: &FastqRecord) -> bool {
        self.predicates.iter().all(|p| p.evaluate(record))
    }

    /// Paired form: both mates must pass every predicate. The pair is
    /// rejected as a unit at the first predicate either mate fails.
    #[must_use]
    pub fn accepts_pair(&self, r1: &FastqRecord, r2: &FastqRecord) -> bool {
        self.predicates.iter().all(|p| p.evaluate(r1) && p.evaluate(r2))
    }
}

/// Keeps records whose mean Phred score meets a threshold.
pub struct MinQualityPredicate {
    min_quality: f64,
    offset: u8,
    evaluated: AtomicU64,
    passed: AtomicU64,
}

impl MinQualityPredicate {
    /// Creates the predicate.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the threshold is outside `[0, 93]` or
    /// the offset is not 33/64.
    pub fn new(min_quality: f64, offset: u8) -> Result<Self> {
        if !(0.0..=f64::from(phred::MAX_PHRED)).contains(&min_quality) {
            return Err(FqflowError::config(format!(
                "quality threshold must be within 0..={}, got {min_quality}",
                phred::MAX_PHRED
            )));
        }
        if !phred::is_supported_offset(offset) {
            return Err(FqflowError::config(format!(
                "phred_offset must be 33 or 64, got {offset}"
            )));
        }
        Ok(Self {
            min_quality,
            offset,
            evaluated: AtomicU64::new(0),
            passed: AtomicU64::new(0),
        })
    }

    /// Records evaluated so far.
    #[must_use]
    pub fn evaluated(&self) -> u64 {
        self.evaluated.load(Ordering::Relaxed)
    }

    /// Records accepted so far.
    #[must_use]
    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }
}

impl ReadPredicate for MinQualityPredicate {
    fn evaluate(&self, record: &FastqRecord) -> bool {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        // An empty quality string can never meet the threshold.
        let passed =
            !record.is_empty() && record.average_quality(self.offset) >= self.min_quality;
        if passed {
            self.passed.fetch_add(1, Ordering::Relaxed);
        }
        passed
    }

    fn name(&self) -> &str {
        "min-quality"
    }
}

/// Keeps records of at least a given length.
pub struct MinLengthPredicate {
    min_length: usize,
    evaluated: AtomicU64,
    passed: AtomicU64,
}

impl MinLengthPredicate {
    /// Creates the predicate.
    #[must_use]
    pub fn new(min_length: usize) -> Self {
        Self { min_length, evaluated: AtomicU64::new(0), passed: AtomicU64::new(0) }
    }

    /// Records evaluated so far.
    #[must_use]
    pub fn evaluated(&self) -> u64 {
        self.evaluated.load(Ordering::Relaxed)
    }

    /// Records accepted so far.
    #[must_use]
    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }
}

impl ReadPredicate for MinLengthPredicate {
    fn evaluate(&self, record: &FastqRecord) -> bool {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        let passed = record.len() >= self.min_length;
        if passed {
            self.passed.fetch_add(1, Ordering::Relaxed);
        }
        passed
    }

    fn name(&self) -> &str {
        "min-length"
    }
}

/// Keeps records with at most `max_n` ambiguous (N) bases.
pub struct MaxNCountPredicate {
    max_n: usize,
    evaluated: AtomicU64,
    passed: AtomicU64,
}

impl MaxNCountPredicate {
    /// Creates the predicate.
    #[must_use]
    pub fn new(max_n: usize) -> Self {
        Self { max_n, evaluated: AtomicU64::new(0), passed: AtomicU64::new(0) }
    }
}

impl ReadPredicate for MaxNCountPredicate {
    fn evaluate(&self, record: &FastqRecord) -> bool {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        let n_count = record.seq().iter().filter(|&&b| b == b'N' || b == b'n').count();
        let passed = n_count <= self.max_n;
        if passed {
            self.passed.fetch_add(1, Ordering::Relaxed);
        }
        passed
    }

    fn name(&self) -> &str {
        "max-n-count"
    }
}
