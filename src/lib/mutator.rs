//! Record mutators and their composition.
//!
//! A mutator rewrites one record in place. It may shrink, lengthen or
//! replace sequence and quality, but must leave them the same length; the
//! record API enforces this for the common operations. Chains apply in
//! list order; a later mutator sees the output of earlier ones.
//!
//! Mutator failures are non-fatal: the record is dropped from the passed
//! set and counted as errored, and the pipeline keeps running. A mutator
//! cannot resurrect a record a predicate already rejected, because
//! predicates run first.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{FqflowError, MutatorError, Result};
use crate::phred;
use crate::record::FastqRecord;

/// Per-record in-place transform. Implementations are invoked
/// concurrently from multiple transform workers on distinct records; any
/// internal counters must be atomic.
pub trait ReadMutator: Send + Sync {
    /// Rewrites the record.
    ///
    /// # Errors
    ///
    /// Returns a [`MutatorError`] when no valid record can be produced;
    /// the record is then dropped and counted as errored.
    fn apply(&self, record: &mut FastqRecord) -> std::result::Result<(), MutatorError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Ordered list of mutators applied in sequence.
#[derive(Default)]
pub struct MutatorChain {
    mutators: Vec<Box<dyn ReadMutator>>,
}

impl MutatorChain {
    /// Creates an empty chain, which leaves records untouched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mutator; it runs after all previously added ones.
    pub fn push(&mut self, mutator: Box<dyn ReadMutator>) {
        self.mutators.push(mutator);
    }

    /// Number of mutators in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }

    /// Applies every mutator in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Propagates the first [`MutatorError`].
    pub fn apply(&self, record: &mut FastqRecord) -> std::result::Result<(), MutatorError> {
        for mutator in &self.mutators {
            mutator.apply(record)?;
        }
        Ok(())
    }

    /// Paired form: the full chain is applied to both mates; a failure on
    /// either mate fails the pair.
    ///
    /// # Errors
    ///
    /// Propagates the first [`MutatorError`] from either mate.
    pub fn apply_pair(
        &self,
        r1: &mut FastqRecord,
        r2: &mut FastqRecord,
    ) -> std::result::Result<(), MutatorError> {
        for mutator in &self.mutators {
            mutator.apply(r1)?;
            mutator.apply(r2)?;
        }
        Ok(())
    }
}

/// Which end(s) the quality trimmer works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimMode {
    /// Trim low-quality bases from the 5' end only.
    FivePrime,
    /// Trim low-quality bases from the 3' end only.
    ThreePrime,
    /// Trim both ends.
    Both,
}

/// Trims low-quality bases off the read ends.
///
/// Scans inward from each selected end until a base meets the quality
/// threshold and keeps the enclosed window. If the window is shorter than
/// the minimum length, the mutator fails and the record is dropped.
pub struct QualityTrimmer {
    threshold: u8,
    min_length: usize,
    mode: TrimMode,
    offset: u8,
    trimmed: AtomicU64,
    bases_removed: AtomicU64,
}

impl QualityTrimmer {
    /// Creates the trimmer.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the threshold exceeds Q93 or the offset
    /// is not 33/64.
    pub fn new(threshold: u8, min_length: usize, mode: TrimMode, offset: u8) -> Result<Self> {
        if threshold > phred::MAX_PHRED {
            return Err(FqflowError::config(format!(
                "trim threshold must be within 0..={}, got {threshold}",
                phred::MAX_PHRED
            )));
        }
        if !phred::is_supported_offset(offset) {
            return Err(FqflowError::config(format!(
                "phred_offset must be 33 or 64, got {offset}"
            )));
        }
        Ok(Self {
            threshold,
            min_length,
            mode,
            offset,
            trimmed: AtomicU64::new(0),
            bases_removed: AtomicU64::new(0),
        })
    }

    /// Records that had at least one base removed.
    #[must_use]
    pub fn trimmed(&self) -> u64 {
        self.trimmed.load(Ordering::Relaxed)
    }

    /// Total bases removed.
    #[must_use]
    pub fn bases_removed(&self) -> u64 {
        self.bases_removed.load(Ordering::Relaxed)
    }

    fn is_high_quality(&self, byte: u8) -> bool {
        phred::decode_quality(byte, self.offset) >= self.threshold
    }
}

impl ReadMutator for QualityTrimmer {
    fn apply(&self, record: &mut FastqRecord) -> std::result::Result<(), MutatorError> {
        let qual = record.qual();
        let len = qual.len();

        let start = match self.mode {
            TrimMode::FivePrime | TrimMode::Both => {
                qual.iter().position(|&b| self.is_high_quality(b)).unwrap_or(len)
            }
            TrimMode::ThreePrime => 0,
        };
        let end = match self.mode {
            TrimMode::ThreePrime | TrimMode::Both => {
                qual.iter().rposition(|&b| self.is_high_quality(b)).map_or(0, |i| i + 1)
            }
            TrimMode::FivePrime => len,
        };

        let kept = end.saturating_sub(start);
        if kept < self.min_length {
            return Err(MutatorError::new(format!(
                "read '{}' is {kept} bases after quality trimming, below the minimum of {}",
                String::from_utf8_lossy(record.id()),
                self.min_length
            )));
        }
        if kept < len {
            record.crop(start..end);
            self.trimmed.fetch_add(1, Ordering::Relaxed);
            self.bases_removed.fetch_add((len - kept) as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "quality-trimmer"
    }
}

/// Length-based trimming strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrimStrategy {
    /// Cap the read at a maximum length, keeping the 5' prefix.
    MaxLength(usize),
    /// Remove a fixed number of bases from the 5' end.
    TrimLeft(usize),
    /// Remove a fixed number of bases from the 3' end.
    TrimRight(usize),
}

/// Trims reads by position rather than quality.
pub struct LengthTrimmer {
    strategy: TrimStrategy,
    trimmed: AtomicU64,
}

impl LengthTrimmer {
    /// Caps reads at `max_length` bases, keeping the 5' prefix.
    #[must_use]
    pub fn max_length(max_length: usize) -> Self {
        Self { strategy: TrimStrategy::MaxLength(max_length), trimmed: AtomicU64::new(0) }
    }

    /// Removes the first `count` bases. Reads shorter than `count` become
    /// empty.
    #[must_use]
    pub fn trim_left(count: usize) -> Self {
        Self { strategy: TrimStrategy::TrimLeft(count), trimmed: AtomicU64::new(0) }
    }

    /// Removes the last `count` bases. Reads shorter than `count` become
    /// empty.
    #[must_use]
    pub fn trim_right(count: usize) -> Self {
        Self { strategy: TrimStrategy::TrimRight(count), trimmed: AtomicU64::new(0) }
    }

    /// Records that had at least one base removed.
    #[must_use]
    pub fn trimmed(&self) -> u64 {
        self.trimmed.load(Ordering::Relaxed)
    }
}

impl ReadMutator for LengthTrimmer {
    fn apply(&self, record: &mut FastqRecord) -> std::result::Result<(), MutatorError> {
        let len = record.len();
        let (start, end) = match self.strategy {
            TrimStrategy::MaxLength(max) => (0, len.min(max)),
            TrimStrategy::TrimLeft(count) => (count.min(len), len),
            TrimStrategy::TrimRight(count) => (0, len.saturating_sub(count)),
        };
        if start > 0 || end < len {
            record.crop(start..end);
            self.trimmed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "length-trimmer"
    }
}

/// Trims everything from the earliest adapter occurrence onward.
///
/// An adapter matches at a position when the overlap with the read is at
/// least `min_overlap` bases and contains at most `max_mismatches`
/// mismatches (case-insensitive). Of all adapters, the earliest match
/// position wins.
pub struct AdapterTrimmer {
    adapters: Vec<Vec<u8>>,
    min_overlap: usize,
    max_mismatches: usize,
    found: AtomicU64,
}

impl AdapterTrimmer {
    /// Creates the trimmer.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the adapter list is empty or the
    /// minimum overlap is zero.
    pub fn new(
        adapters: Vec<Vec<u8>>,
        min_overlap: usize,
        max_mismatches: usize,
    ) -> Result<Self> {
        if adapters.is_empty() {
            return Err(FqflowError::config("adapter list must not be empty"));
        }
        if min_overlap == 0 {
            return Err(FqflowError::config("adapter minimum overlap must be >= 1"));
        }
        Ok(Self { adapters, min_overlap, max_mismatches, found: AtomicU64::new(0) })
    }

    /// Records in which an adapter was found.
    #[must_use]
    pub fn found(&self) -> u64 {
        self.found.load(Ordering::Relaxed)
    }

    fn find_adapter(&self, seq: &[u8], adapter: &[u8]) -> Option<usize> {
        if seq.len() < self.min_overlap || adapter.len() < self.min_overlap {
            return None;
        }
        for start in 0..=(seq.len() - self.min_overlap) {
            let overlap = (seq.len() - start).min(adapter.len());
            if overlap < self.min_overlap {
                break;
            }
            let mismatches = seq[start..start + overlap]
                .iter()
                .zip(&adapter[..overlap])
                .filter(|(a, b)| !a.eq_ignore_ascii_case(b))
                .count();
            if mismatches <= self.max_mismatches {
                return Some(start);
            }
        }
        None
    }
}

impl ReadMutator for AdapterTrimmer {
    fn apply(&self, record: &mut FastqRecord) -> std::result::Result<(), MutatorError> {
        let earliest = self
            .adapters
            .iter()
            .filter_map(|adapter| self.find_adapter(record.seq(), adapter))
            .min();
        if let Some(position) = earliest {
            record.truncate(position);
            self.found.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "adapter-trimmer"
    }
}
