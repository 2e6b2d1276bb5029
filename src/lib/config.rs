//! Engine configuration.
//!
//! [`PipelineConfig`] carries every knob the pipelines accept. Validation
//! runs before the parse stage starts, so a bad configuration is reported
//! without touching any input or output file.

use std::path::PathBuf;

use crate::errors::{FqflowError, Result};
use crate::phred;

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default cap on in-flight batches (token budget).
pub const DEFAULT_TOKEN_BUDGET: usize = 16;

/// Default maximum number of batches the pool may hold.
pub const DEFAULT_POOL_CAPACITY: usize = 50;

/// Configuration for the processing and statistics pipelines.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Input FASTQ path (plain or gzip-compressed).
    pub input_path: PathBuf,
    /// Optional mate path; when set, batches carry paired records.
    pub input_path_mate: Option<PathBuf>,
    /// Output path. Required by the processing pipeline, unused by the
    /// statistics pipeline.
    pub output_path: Option<PathBuf>,
    /// Records per batch. Must be >= 1.
    pub batch_size: usize,
    /// Transform-stage parallelism. 0 means "use hardware concurrency";
    /// 1 selects the sequential path.
    pub worker_count: usize,
    /// In-flight batch cap. Must be >= 2.
    pub token_budget: usize,
    /// Maximum batches the pool may hold. Must be >= `token_budget`.
    pub pool_capacity: usize,
    /// When false, batches are freshly allocated and never recycled.
    pub enable_memory_pool: bool,
    /// Toggles the non-essential per-stage timers.
    pub enable_statistics: bool,
    /// Quality encoding offset: 33 (Sanger) or 64 (Illumina 1.3+).
    pub phred_offset: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            input_path_mate: None,
            output_path: None,
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: 0,
            token_budget: DEFAULT_TOKEN_BUDGET,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            enable_memory_pool: true,
            enable_statistics: true,
            phred_offset: phred::PHRED_OFFSET_SANGER,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration for the given input with all defaults.
    #[must_use]
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self { input_path: input_path.into(), ..Self::default() }
    }

    /// Sets the output path.
    #[must_use]
    pub fn with_output(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(output_path.into());
        self
    }

    /// Sets the mate input path, enabling paired-end mode.
    #[must_use]
    pub fn with_mate(mut self, mate_path: impl Into<PathBuf>) -> Self {
        self.input_path_mate = Some(mate_path.into());
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the transform-stage worker count.
    #[must_use]
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Sets the token budget.
    #[must_use]
    pub fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.token_budget = token_budget;
        self
    }

    /// Sets the pool capacity.
    #[must_use]
    pub fn with_pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }

    /// Sets the quality encoding offset.
    #[must_use]
    pub fn with_phred_offset(mut self, phred_offset: u8) -> Self {
        self.phred_offset = phred_offset;
        self
    }

    /// Whether a mate input was configured.
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.input_path_mate.is_some()
    }

    /// Resolves `worker_count == 0` to the hardware concurrency.
    #[must_use]
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            self.worker_count
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error when the input path is missing, the batch
    /// size is zero, the token budget is below 2, the pool capacity is
    /// below the token budget, the Phred offset is unsupported, or
    /// (`require_output` only) no output path is set.
    pub fn validate(&self, require_output: bool) -> Result<()> {
        if self.input_path.as_os_str().is_empty() {
            return Err(FqflowError::config("input path is required"));
        }
        if require_output && self.output_path.is_none() {
            return Err(FqflowError::config("output path is required"));
        }
        if self.batch_size == 0 {
            return Err(FqflowError::config("batch_size must be >= 1"));
        }
        if self.token_budget < 2 {
            return Err(FqflowError::config(format!(
                "token_budget must be >= 2, got {}",
                self.token_budget
            )));
        }
        if self.pool_capacity < self.token_budget {
            return Err(FqflowError::config(format!(
                "pool_capacity ({}) must be >= token_budget ({})",
                self.pool_capacity, self.token_budget
            )));
        }
        if !phred::is_supported_offset(self.phred_offset) {
            return Err(FqflowError::config(format!(
                "phred_offset must be 33 or 64, got {}",
                self.phred_offset
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new("in.fq.gz");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.token_budget, DEFAULT_TOKEN_BUDGET);
        assert_eq!(config.pool_capacity, DEFAULT_POOL_CAPACITY);
        assert_eq!(config.phred_offset, 33);
        assert!(config.enable_memory_pool);
        assert!(!config.is_paired());
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_missing_input_rejected() {
        let config = PipelineConfig::default();
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_output_required_for_processing() {
        let config = PipelineConfig::new("in.fq");
        assert!(config.validate(true).is_err());
        assert!(config.clone().with_output("out.fq").validate(true).is_ok());
    }

    #[test]
    fn test_batch_size_zero_rejected() {
        let config = PipelineConfig::new("in.fq").with_batch_size(0);
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_token_budget_floor() {
        let config = PipelineConfig::new("in.fq").with_token_budget(1);
        assert!(config.validate(false).is_err());
        let config = PipelineConfig::new("in.fq").with_token_budget(2).with_pool_capacity(2);
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_pool_capacity_must_cover_tokens() {
        let config = PipelineConfig::new("in.fq").with_token_budget(8).with_pool_capacity(4);
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_phred_offset_validation() {
        assert!(PipelineConfig::new("in.fq").with_phred_offset(64).validate(false).is_ok());
        assert!(PipelineConfig::new("in.fq").with_phred_offset(42).validate(false).is_err());
    }

    #[test]
    fn test_effective_worker_count() {
        assert_eq!(PipelineConfig::new("in.fq").with_workers(4).effective_worker_count(), 4);
        assert!(PipelineConfig::new("in.fq").effective_worker_count() >= 1);
    }
}
