//! Per-position statistics report for a FASTQ file.

use anyhow::{Context, Result};
use clap::Parser;
use fqflow_lib::config::PipelineConfig;
use fqflow_lib::logging::OperationTimer;
use fqflow_lib::pipeline::StatisticsPipeline;
use fqflow_lib::report::write_report;
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use crate::commands::command::Command;

/// Generate a per-position statistics report.
#[derive(Debug, Parser)]
#[command(
    name = "stat",
    about = "Generate a per-position statistics report",
    long_about = r#"
Tally per-position base composition and quality histograms over a FASTQ
file (plain or gzip) and write the fqStat-style text report. The input
must have a fixed read length.

EXAMPLES:

  fqflow stat -i reads.fq.gz -o reads.fqstat.txt

  # Illumina 1.3+ quality encoding
  fqflow stat -i reads.fq.gz -o reads.fqstat.txt --phred-offset 64
"#
)]
pub struct Stat {
    /// Input FASTQ file (.fq or .fq.gz).
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output report path.
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Records per batch.
    #[arg(long = "batch-size", default_value_t = 10_000)]
    pub batch_size: usize,

    /// Worker threads for the tally stage (0 = all cores, 1 = sequential).
    #[arg(short = 't', long = "threads", default_value_t = 0)]
    pub threads: usize,

    /// Cap on in-flight batches.
    #[arg(long = "token-budget", default_value_t = 16)]
    pub token_budget: usize,

    /// Maximum batches held by the recycling pool.
    #[arg(long = "pool-capacity", default_value_t = 50)]
    pub pool_capacity: usize,

    /// Quality encoding offset: 33 (Sanger) or 64 (Illumina 1.3+).
    #[arg(long = "phred-offset", default_value_t = 33)]
    pub phred_offset: u8,
}

impl Command for Stat {
    fn execute(&self) -> Result<()> {
        info!("Input: {}", self.input.display());
        info!("Report: {}", self.output.display());

        let config = PipelineConfig::new(&self.input)
            .with_batch_size(self.batch_size)
            .with_workers(self.threads)
            .with_token_budget(self.token_budget)
            .with_pool_capacity(self.pool_capacity)
            .with_phred_offset(self.phred_offset);

        let timer = OperationTimer::new("Tallying statistics");
        let outcome =
            StatisticsPipeline::new(config).run().context("statistics pipeline failed")?;
        timer.log_completion(outcome.summary.records_in);

        let name = self
            .input
            .file_name()
            .map_or_else(|| self.input.display().to_string(), |n| n.to_string_lossy().into_owned());
        let file = File::create(&self.output)
            .with_context(|| format!("failed to create report '{}'", self.output.display()))?;
        let mut writer = BufWriter::new(file);
        write_report(&mut writer, &name, self.phred_offset, &outcome.stats)
            .with_context(|| format!("failed to write report '{}'", self.output.display()))?;

        info!("Statistics report saved to '{}'", self.output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let stat =
            Stat::try_parse_from(["stat", "-i", "in.fq", "-o", "out.txt"]).unwrap();
        assert_eq!(stat.batch_size, 10_000);
        assert_eq!(stat.phred_offset, 33);
        assert_eq!(stat.threads, 0);
    }
}
