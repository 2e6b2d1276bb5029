//! Record source and sink contracts, plus the gzip-aware FASTQ file
//! adapters that satisfy them.
//!
//! The pipelines only ever talk to [`RecordSource`] and [`RecordSink`];
//! anything that can fill or drain a batch works. Both are driven from at
//! most one thread at a time (the parse and sink stages are serial), so
//! implementations do not need internal locking.
//!
//! The file adapters accept plain or gzip-compressed FASTQ, selected by
//! the `.gz` extension. Decompressed bytes are counted so the run summary
//! can report real throughput instead of an estimate.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use seq_io::fastq::{Reader as FastqReader, Record as _};

use crate::errors::{FqflowError, Result};
use crate::record::{FastqRecord, RecordBatch};

/// Outcome of one [`RecordSource::fill`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// `n` records (pairs, in paired mode) were appended, `0 < n <= max`.
    Filled(usize),
    /// The stream is exhausted; no further `fill` calls will be made.
    Eof,
}

/// Pull-side streaming contract consumed by the parse stage.
pub trait RecordSource: Send {
    /// Appends up to `max_records` records to `batch` in input order.
    ///
    /// # Errors
    ///
    /// Returns a `Source` error on I/O failure, malformed FASTQ framing,
    /// or mate desync; the pipeline treats it as fatal.
    fn fill(&mut self, batch: &mut RecordBatch, max_records: usize) -> Result<FillStatus>;

    /// Bytes consumed so far, if this source counts them. Used for
    /// throughput reporting; `None` falls back to an estimate.
    fn bytes_read(&self) -> Option<u64> {
        None
    }

    /// Releases underlying resources. Called exactly once after
    /// end-of-run.
    ///
    /// # Errors
    ///
    /// Returns a `Source` error if teardown fails.
    fn close(&mut self) -> Result<()>;
}

/// Push-side streaming contract consumed by the sink stage. Calls arrive
/// in strict batch-serial order.
pub trait RecordSink: Send {
    /// Durably hands the batch's records to the output adapter.
    ///
    /// # Errors
    ///
    /// Returns a `Sink` error on I/O failure; the pipeline treats it as
    /// fatal but keeps already-written batches on disk.
    fn write(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Flushes and releases the output. Called exactly once after
    /// end-of-run.
    ///
    /// # Errors
    ///
    /// Returns a `Sink` error if flushing fails.
    fn close(&mut self) -> Result<()>;
}

/// Read wrapper that counts the bytes flowing through it.
struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

fn has_gz_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

fn open_raw_reader(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file = File::open(path)
        .map_err(|e| FqflowError::source(format!("failed to open '{}': {e}", path.display())))?;
    if has_gz_extension(path) {
        Ok(Box::new(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// One FASTQ stream: a seq_io parser over a (possibly gzip) file, with
/// byte counting.
struct FastqStream {
    reader: FastqReader<CountingReader<Box<dyn Read + Send>>>,
    bytes: Arc<AtomicU64>,
    path: String,
}

impl FastqStream {
    fn open(path: &Path) -> Result<Self> {
        let bytes = Arc::new(AtomicU64::new(0));
        let counting = CountingReader { inner: open_raw_reader(path)?, count: Arc::clone(&bytes) };
        Ok(Self {
            reader: FastqReader::new(counting),
            bytes,
            path: path.display().to_string(),
        })
    }

    /// Parses the next record, copying it into owned storage.
    fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        match self.reader.next() {
            None => Ok(None),
            Some(Ok(rec)) => {
                let record = FastqRecord::from_parts(rec.head(), rec.seq(), b"+", rec.qual())?;
                Ok(Some(record))
            }
            Some(Err(e)) => Err(FqflowError::source(format!(
                "malformed FASTQ in '{}': {e}",
                self.path
            ))),
        }
    }

    fn bytes_read(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Single-end FASTQ file source.
pub struct FastqFileSource {
    stream: FastqStream,
}

impl FastqFileSource {
    /// Opens a plain or gzip FASTQ file.
    ///
    /// # Errors
    ///
    /// Returns a `Source` error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { stream: FastqStream::open(path.as_ref())? })
    }
}

impl RecordSource for FastqFileSource {
    fn fill(&mut self, batch: &mut RecordBatch, max_records: usize) -> Result<FillStatus> {
        let mut appended = 0;
        while appended < max_records {
            match self.stream.next_record()? {
                Some(record) => {
                    batch.push(record);
                    appended += 1;
                }
                None => break,
            }
        }
        if appended == 0 { Ok(FillStatus::Eof) } else { Ok(FillStatus::Filled(appended)) }
    }

    fn bytes_read(&self) -> Option<u64> {
        Some(self.stream.bytes_read())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Paired-end FASTQ source reading two files in lockstep.
///
/// Position *i* of each appended vector is the corresponding mate. A
/// stream ending before its sibling is reported as mate desync.
pub struct PairedFastqSource {
    r1: FastqStream,
    r2: FastqStream,
}

impl PairedFastqSource {
    /// Opens both mate files.
    ///
    /// # Errors
    ///
    /// Returns a `Source` error if either file cannot be opened.
    pub fn open(path1: impl AsRef<Path>, path2: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            r1: FastqStream::open(path1.as_ref())?,
            r2: FastqStream::open(path2.as_ref())?,
        })
    }
}

impl RecordSource for PairedFastqSource {
    fn fill(&mut self, batch: &mut RecordBatch, max_records: usize) -> Result<FillStatus> {
        let mut appended = 0;
        while appended < max_records {
            let first = self.r1.next_record()?;
            let second = self.r2.next_record()?;
            match (first, second) {
                (Some(r1), Some(r2)) => {
                    batch.push_pair(r1, r2);
                    appended += 1;
                }
                (None, None) => break,
                (Some(r1), None) => {
                    return Err(FqflowError::source(format!(
                        "mate desync: '{}' has record '{}' with no mate in '{}'",
                        self.r1.path,
                        String::from_utf8_lossy(r1.id()),
                        self.r2.path
                    )));
                }
                (None, Some(r2)) => {
                    return Err(FqflowError::source(format!(
                        "mate desync: '{}' has record '{}' with no mate in '{}'",
                        self.r2.path,
                        String::from_utf8_lossy(r2.id()),
                        self.r1.path
                    )));
                }
            }
        }
        if appended == 0 { Ok(FillStatus::Eof) } else { Ok(FillStatus::Filled(appended)) }
    }

    fn bytes_read(&self) -> Option<u64> {
        Some(self.r1.bytes_read() + self.r2.bytes_read())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

enum SinkWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl SinkWriter {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            SinkWriter::Plain(w) => w.write_all(buf),
            SinkWriter::Gzip(w) => w.write_all(buf),
        }
    }

    fn finish(&mut self) -> std::io::Result<()> {
        match self {
            SinkWriter::Plain(w) => w.flush(),
            SinkWriter::Gzip(w) => {
                w.try_finish()?;
                w.get_mut().flush()
            }
        }
    }
}

/// FASTQ file sink writing records in canonical four-line form. Paired
/// batches are written interleaved (first mate, then second mate).
pub struct FastqFileSink {
    writer: SinkWriter,
    path: String,
}

impl FastqFileSink {
    /// Creates the output file, gzip-compressed when the path ends in
    /// `.gz`.
    ///
    /// # Errors
    ///
    /// Returns a `Sink` error if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| FqflowError::sink(format!("failed to create '{}': {e}", path.display())))?;
        let buffered = BufWriter::new(file);
        let writer = if has_gz_extension(path) {
            SinkWriter::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            SinkWriter::Plain(buffered)
        };
        Ok(Self { writer, path: path.display().to_string() })
    }

    fn write_record(&mut self, record: &FastqRecord) -> std::io::Result<()> {
        self.writer.write_all(b"@")?;
        self.writer.write_all(record.id())?;
        self.writer.write_all(b"\n")?;
        self.writer.write_all(record.seq())?;
        self.writer.write_all(b"\n")?;
        self.writer.write_all(record.sep())?;
        self.writer.write_all(b"\n")?;
        self.writer.write_all(record.qual())?;
        self.writer.write_all(b"\n")
    }

    fn write_batch(&mut self, batch: &RecordBatch) -> std::io::Result<()> {
        if batch.is_paired() {
            for (r1, r2) in batch.records().iter().zip(batch.mates()) {
                self.write_record(r1)?;
                self.write_record(r2)?;
            }
        } else {
            for record in batch.records() {
                self.write_record(record)?;
            }
        }
        Ok(())
    }
}

impl RecordSink for FastqFileSink {
    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.write_batch(batch)
            .map_err(|e| FqflowError::sink(format!("failed to write '{}': {e}", self.path)))
    }

    fn close(&mut self) -> Result<()> {
        self.writer
            .finish()
            .map_err(|e| FqflowError::sink(format!("failed to flush '{}': {e}", self.path)))
    }
}
