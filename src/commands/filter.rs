//! Filter and transform FASTQ reads.
//!
//! Maps command-line flags onto a `PipelineConfig` plus predicate and
//! mutator chains, then runs the processing pipeline. No pipeline logic
//! lives here.

use anyhow::{Context, Result, bail};
use clap::Parser;
use fqflow_lib::config::PipelineConfig;
use fqflow_lib::logging::{OperationTimer, log_run_summary};
use fqflow_lib::mutator::{AdapterTrimmer, LengthTrimmer, QualityTrimmer, TrimMode};
use fqflow_lib::pipeline::ProcessingPipeline;
use fqflow_lib::predicate::{MaxNCountPredicate, MinLengthPredicate, MinQualityPredicate};
use log::info;
use std::path::PathBuf;

use crate::commands::command::Command;

/// Filter and transform FASTQ reads.
#[derive(Debug, Parser)]
#[command(
    name = "filter",
    about = "Filter and transform FASTQ reads",
    long_about = r#"
Stream one or two FASTQ files (plain or gzip) through a parallel
processing pipeline. Predicates drop reads; mutators rewrite survivors.
Output preserves input order exactly.

EXAMPLES:

  # Drop reads with mean quality below Q30
  fqflow filter -i in.fq.gz -o out.fq.gz --min-quality 30

  # Paired-end, quality-trim both ends and enforce a length floor
  fqflow filter -i r1.fq.gz -I r2.fq.gz -o out.fq.gz \
      --trim-quality 20 --min-length 50

  # Remove adapter read-through
  fqflow filter -i in.fq.gz -o out.fq.gz --adapter AGATCGGAAGAGC
"#
)]
pub struct Filter {
    /// Input FASTQ file (.fq or .fq.gz).
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Mate FASTQ file for paired-end mode.
    #[arg(short = 'I', long = "input-mate")]
    pub input_mate: Option<PathBuf>,

    /// Output FASTQ file; compressed when the name ends in .gz.
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Records per batch.
    #[arg(long = "batch-size", default_value_t = 10_000)]
    pub batch_size: usize,

    /// Worker threads for the transform stage (0 = all cores, 1 = sequential).
    #[arg(short = 't', long = "threads", default_value_t = 0)]
    pub threads: usize,

    /// Cap on in-flight batches.
    #[arg(long = "token-budget", default_value_t = 16)]
    pub token_budget: usize,

    /// Maximum batches held by the recycling pool.
    #[arg(long = "pool-capacity", default_value_t = 50)]
    pub pool_capacity: usize,

    /// Allocate every batch fresh instead of recycling.
    #[arg(long = "no-memory-pool", default_value_t = false)]
    pub no_memory_pool: bool,

    /// Quality encoding offset: 33 (Sanger) or 64 (Illumina 1.3+).
    #[arg(long = "phred-offset", default_value_t = 33)]
    pub phred_offset: u8,

    /// Drop reads whose mean quality is below this value.
    #[arg(short = 'q', long = "min-quality")]
    pub min_quality: Option<f64>,

    /// Drop reads shorter than this many bases.
    #[arg(short = 'l', long = "min-length")]
    pub min_length: Option<usize>,

    /// Drop reads with more than this many N bases.
    #[arg(long = "max-n")]
    pub max_n: Option<usize>,

    /// Trim bases below this quality from both read ends.
    #[arg(long = "trim-quality")]
    pub trim_quality: Option<u8>,

    /// Reads shorter than this after quality trimming are dropped.
    #[arg(long = "trim-min-length", default_value_t = 20)]
    pub trim_min_length: usize,

    /// Remove this many bases from the 3' end.
    #[arg(long = "trim-right")]
    pub trim_right: Option<usize>,

    /// Cap reads at this length, keeping the 5' prefix.
    #[arg(long = "max-length")]
    pub max_length: Option<usize>,

    /// Adapter sequence to trim at its earliest occurrence (repeatable).
    #[arg(long = "adapter")]
    pub adapters: Vec<String>,

    /// Minimum adapter/read overlap for a match.
    #[arg(long = "adapter-min-overlap", default_value_t = 8)]
    pub adapter_min_overlap: usize,

    /// Mismatches tolerated inside the adapter overlap.
    #[arg(long = "adapter-max-mismatches", default_value_t = 1)]
    pub adapter_max_mismatches: usize,
}

impl Filter {
    fn build_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(&self.input)
            .with_output(&self.output)
            .with_batch_size(self.batch_size)
            .with_workers(self.threads)
            .with_token_budget(self.token_budget)
            .with_pool_capacity(self.pool_capacity)
            .with_phred_offset(self.phred_offset);
        if let Some(mate) = &self.input_mate {
            config = config.with_mate(mate);
        }
        config.enable_memory_pool = !self.no_memory_pool;
        config
    }

    fn build_pipeline(&self) -> Result<ProcessingPipeline> {
        let mut pipeline = ProcessingPipeline::new(self.build_config());

        // Predicates first, in a fixed cheap-to-expensive order.
        if let Some(min_length) = self.min_length {
            pipeline.add_predicate(Box::new(MinLengthPredicate::new(min_length)));
        }
        if let Some(max_n) = self.max_n {
            pipeline.add_predicate(Box::new(MaxNCountPredicate::new(max_n)));
        }
        if let Some(min_quality) = self.min_quality {
            pipeline.add_predicate(Box::new(
                MinQualityPredicate::new(min_quality, self.phred_offset)
                    .context("invalid --min-quality")?,
            ));
        }

        if !self.adapters.is_empty() {
            let adapters: Vec<Vec<u8>> =
                self.adapters.iter().map(|a| a.as_bytes().to_vec()).collect();
            if adapters.iter().any(|a| a.iter().any(|b| !b.is_ascii_alphabetic())) {
                bail!("adapter sequences must be plain base letters");
            }
            pipeline.add_mutator(Box::new(
                AdapterTrimmer::new(
                    adapters,
                    self.adapter_min_overlap,
                    self.adapter_max_mismatches,
                )
                .context("invalid adapter settings")?,
            ));
        }
        if let Some(threshold) = self.trim_quality {
            pipeline.add_mutator(Box::new(
                QualityTrimmer::new(
                    threshold,
                    self.trim_min_length,
                    TrimMode::Both,
                    self.phred_offset,
                )
                .context("invalid --trim-quality")?,
            ));
        }
        if let Some(count) = self.trim_right {
            pipeline.add_mutator(Box::new(LengthTrimmer::trim_right(count)));
        }
        if let Some(max_length) = self.max_length {
            pipeline.add_mutator(Box::new(LengthTrimmer::max_length(max_length)));
        }

        Ok(pipeline)
    }
}

impl Command for Filter {
    fn execute(&self) -> Result<()> {
        info!("Input: {}", self.input.display());
        if let Some(mate) = &self.input_mate {
            info!("Mate input: {}", mate.display());
        }
        info!("Output: {}", self.output.display());

        let timer = OperationTimer::new("Filtering reads");
        let pipeline = self.build_pipeline()?;
        let summary = pipeline.run().context("processing pipeline failed")?;

        timer.log_completion(summary.records_in);
        log_run_summary(&summary);
        Ok(())
    }
}
