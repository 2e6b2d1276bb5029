//! Error types for fqflow pipelines.
//!
//! Fatal pipeline failures are carried by [`FqflowError`]; the first fatal
//! error observed by any stage wins and is returned from `run`. Mutator
//! failures are deliberately a separate, non-fatal type ([`MutatorError`]):
//! they drop the offending record and are surfaced through the run counters
//! instead of aborting the pipeline.

use thiserror::Error;

/// Result type alias for fqflow operations
pub type Result<T> = std::result::Result<T, FqflowError>;

/// Fatal error kinds produced by the engine.
#[derive(Error, Debug)]
pub enum FqflowError {
    /// Invalid configuration, detected before the parse stage starts
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Explanation of what is invalid
        reason: String,
    },

    /// Input failure: I/O error, malformed FASTQ framing, or mate desync
    #[error("Source error: {reason}")]
    Source {
        /// Explanation of the failure
        reason: String,
    },

    /// Output failure while writing records
    #[error("Sink error: {reason}")]
    Sink {
        /// Explanation of the failure
        reason: String,
    },

    /// The batch pool was shut down while an acquire was waiting
    #[error("Batch pool is shutting down")]
    PoolShutDown,

    /// Statistics require every record to have the same length
    #[error("Statistics require a fixed read length: expected {expected}, found {found}")]
    VariableReadLength {
        /// Read length inferred from earlier records
        expected: usize,
        /// Conflicting length that was encountered
        found: usize,
    },

    /// A worker thread could not be spawned at pipeline startup
    #[error("Failed to spawn worker thread: {reason}")]
    WorkerSpawn {
        /// Underlying spawn failure
        reason: String,
    },

    /// A worker thread panicked while processing a batch
    #[error("Worker thread panicked: {reason}")]
    WorkerPanic {
        /// Panic payload, if it carried a message
        reason: String,
    },
}

impl FqflowError {
    /// Build a `Config` error from anything displayable.
    pub fn config(reason: impl Into<String>) -> Self {
        FqflowError::Config { reason: reason.into() }
    }

    /// Build a `Source` error from anything displayable.
    pub fn source(reason: impl Into<String>) -> Self {
        FqflowError::Source { reason: reason.into() }
    }

    /// Build a `Sink` error from anything displayable.
    pub fn sink(reason: impl Into<String>) -> Self {
        FqflowError::Sink { reason: reason.into() }
    }
}

/// Non-fatal failure raised by a mutator that could not produce a valid
/// record. The record is dropped and `records_errored` is incremented;
/// processing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct MutatorError {
    /// Explanation of why the record could not be rewritten
    pub reason: String,
}

impl MutatorError {
    /// Create a new mutator error.
    pub fn new(reason: impl Into<String>) -> Self {
        MutatorError { reason: reason.into() }
    }
}
