//! FASTQ record and batch model.
//!
//! A [`FastqRecord`] owns the four components of one FASTQ entry as byte
//! vectors. The sequence and quality strings are only mutable through
//! operations that keep them the same length, so the core invariant
//! `seq.len() == qual.len()` cannot be broken by a well-typed caller.
//!
//! A [`RecordBatch`] is an ordered group of records processed as a unit,
//! tagged with a serial number assigned by the parse stage. In paired-end
//! mode the batch carries a second, equal-length vector of mate records;
//! record *i* of each vector forms one pair.
//!
//! The model is alphabet-agnostic: any byte is admissible in a sequence.
//! Validators for narrower alphabets are exposed as free functions for
//! predicates and mutators to call.

use std::ops::Range;

use crate::errors::{FqflowError, MutatorError, Result};
use crate::phred;

/// One FASTQ entry: identifier, sequence, separator tag, and quality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastqRecord {
    id: Vec<u8>,
    seq: Vec<u8>,
    sep: Vec<u8>,
    qual: Vec<u8>,
}

impl FastqRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from its four components.
    ///
    /// # Errors
    ///
    /// Returns a `Source` error if the identifier is empty or the sequence
    /// and quality lengths differ; such input is malformed FASTQ.
    pub fn from_parts(id: &[u8], seq: &[u8], sep: &[u8], qual: &[u8]) -> Result<Self> {
        if id.is_empty() {
            return Err(FqflowError::source("FASTQ record has an empty identifier"));
        }
        if seq.len() != qual.len() {
            return Err(FqflowError::source(format!(
                "sequence/quality length mismatch for record '{}': {} vs {}",
                String::from_utf8_lossy(id),
                seq.len(),
                qual.len()
            )));
        }
        Ok(Self { id: id.to_vec(), seq: seq.to_vec(), sep: sep.to_vec(), qual: qual.to_vec() })
    }

    /// Record identifier, without the leading `@`.
    #[must_use]
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Sequence bases.
    #[must_use]
    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    /// Separator tag line content (usually a lone `+`).
    #[must_use]
    pub fn sep(&self) -> &[u8] {
        &self.sep
    }

    /// ASCII-encoded quality string, same length as the sequence.
    #[must_use]
    pub fn qual(&self) -> &[u8] {
        &self.qual
    }

    /// Number of bases in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    /// Whether the record has zero bases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Mean Phred score of the record's quality string.
    #[must_use]
    pub fn average_quality(&self, offset: u8) -> f64 {
        phred::average_quality(&self.qual, offset)
    }

    /// Shortens sequence and quality to `new_len` bases. A longer
    /// `new_len` is a no-op.
    pub fn truncate(&mut self, new_len: usize) {
        self.seq.truncate(new_len);
        self.qual.truncate(new_len);
    }

    /// Keeps only the bases in `range`, dropping both ends.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds or decreasing.
    pub fn crop(&mut self, range: Range<usize>) {
        assert!(range.start <= range.end && range.end <= self.seq.len(), "crop out of bounds");
        self.seq.drain(..range.start);
        self.seq.truncate(range.end - range.start);
        self.qual.drain(..range.start);
        self.qual.truncate(range.end - range.start);
    }

    /// Replaces sequence and quality together.
    ///
    /// # Errors
    ///
    /// Returns a [`MutatorError`] if the replacements differ in length;
    /// the record is left unchanged in that case.
    pub fn set_seq_and_qual(
        &mut self,
        seq: Vec<u8>,
        qual: Vec<u8>,
    ) -> std::result::Result<(), MutatorError> {
        if seq.len() != qual.len() {
            return Err(MutatorError::new(format!(
                "replacement sequence and quality differ in length: {} vs {}",
                seq.len(),
                qual.len()
            )));
        }
        self.seq = seq;
        self.qual = qual;
        Ok(())
    }

    /// Clears all four components, retaining allocations.
    pub fn clear(&mut self) {
        self.id.clear();
        self.seq.clear();
        self.sep.clear();
        self.qual.clear();
    }
}

/// Returns true if every byte is an upper-case A, C, G or T.
#[must_use]
pub fn is_acgt(seq: &[u8]) -> bool {
    seq.iter().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T'))
}

/// Returns true if every byte is an upper-case A, C, G, T or N.
#[must_use]
pub fn is_acgtn(seq: &[u8]) -> bool {
    seq.iter().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'N'))
}

/// Maps a base to its column in per-position base tallies:
/// A=0, C=1, G=2, T=3, anything else (including N) = 4.
#[inline]
#[must_use]
pub fn base_index(base: u8) -> usize {
    match base {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => 4,
    }
}

/// An ordered group of records plus a serial number assigned by the parse
/// stage. Batches are acquired cleared from the pool, mutated by exactly
/// one stage at a time, and released back exactly once after the sink has
/// observed them.
#[derive(Debug, Default)]
pub struct RecordBatch {
    batch_id: Option<u64>,
    records: Vec<FastqRecord>,
    mates: Vec<FastqRecord>,
    paired: bool,
}

impl RecordBatch {
    /// Creates an empty batch with room for `capacity` records.
    #[must_use]
    pub fn with_capacity(capacity: usize, paired: bool) -> Self {
        Self {
            batch_id: None,
            records: Vec::with_capacity(capacity),
            mates: if paired { Vec::with_capacity(capacity) } else { Vec::new() },
            paired,
        }
    }

    /// Serial number assigned by the parse stage, if any.
    #[must_use]
    pub fn batch_id(&self) -> Option<u64> {
        self.batch_id
    }

    /// Tags the batch with its serial number.
    pub fn set_batch_id(&mut self, id: u64) {
        self.batch_id = Some(id);
    }

    /// Whether this batch carries a mate vector.
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.paired
    }

    /// Number of records (pairs, in paired mode).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a single-end record.
    pub fn push(&mut self, record: FastqRecord) {
        debug_assert!(!self.paired, "push on a paired batch");
        self.records.push(record);
    }

    /// Appends one pair; position *i* of each vector is one pair.
    pub fn push_pair(&mut self, r1: FastqRecord, r2: FastqRecord) {
        debug_assert!(self.paired, "push_pair on a single-end batch");
        self.records.push(r1);
        self.mates.push(r2);
    }

    /// First-mate records in input order.
    #[must_use]
    pub fn records(&self) -> &[FastqRecord] {
        &self.records
    }

    /// Mutable access to first-mate records.
    pub fn records_mut(&mut self) -> &mut [FastqRecord] {
        &mut self.records
    }

    /// Second-mate records (empty in single-end mode).
    #[must_use]
    pub fn mates(&self) -> &[FastqRecord] {
        &self.mates
    }

    /// Moves the record vector out, leaving it empty.
    pub fn take_records(&mut self) -> Vec<FastqRecord> {
        std::mem::take(&mut self.records)
    }

    /// Moves the mate vector out, leaving it empty.
    pub fn take_mates(&mut self) -> Vec<FastqRecord> {
        std::mem::take(&mut self.mates)
    }

    /// Replaces the record vector, e.g. with the survivors of a transform.
    pub fn set_records(&mut self, records: Vec<FastqRecord>) {
        self.records = records;
    }

    /// Replaces both vectors of a paired batch.
    ///
    /// # Panics
    ///
    /// Panics if the vectors differ in length.
    pub fn set_pairs(&mut self, records: Vec<FastqRecord>, mates: Vec<FastqRecord>) {
        assert_eq!(records.len(), mates.len(), "paired batch vectors must stay in lockstep");
        self.records = records;
        self.mates = mates;
    }

    /// Clears records, mates and the serial number, retaining storage so a
    /// recycled batch does not reallocate its backbone.
    pub fn clear(&mut self) {
        self.batch_id = None;
        self.records.clear();
        self.mates.clear();
    }

    /// Total bases across all records (both mates in paired mode).
    #[must_use]
    pub fn total_bases(&self) -> usize {
        self.records.iter().map(FastqRecord::len).sum::<usize>()
            + self.mates.iter().map(FastqRecord::len).sum::<usize>()
    }
}
