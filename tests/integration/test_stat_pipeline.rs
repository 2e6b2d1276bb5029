//! End-to-end statistics pipeline scenarios.

use fqflow_lib::config::PipelineConfig;
use fqflow_lib::pipeline::StatisticsPipeline;
use fqflow_lib::report::write_report;
use tempfile::TempDir;

use crate::helpers::{fastq_text, random_records, write_fastq};

fn stat_config(input: &std::path::Path, batch_size: usize, workers: usize) -> PipelineConfig {
    PipelineConfig::new(input)
        .with_batch_size(batch_size)
        .with_workers(workers)
        .with_token_budget(4)
        .with_pool_capacity(8)
}

#[test]
fn test_accumulator_identical_across_partitions() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let records = random_records(1_000, 4, 42);
    write_fastq(&input, &fastq_text(&records));

    let mut accumulators = Vec::new();
    let mut reports = Vec::new();
    for (workers, batch_size) in [(1, 1), (1, 1_000), (8, 10), (8, 1_000)] {
        let outcome = StatisticsPipeline::new(stat_config(&input, batch_size, workers))
            .run()
            .unwrap();
        assert_eq!(outcome.stats.total_reads(), 1_000);
        assert_eq!(outcome.summary.records_in, 1_000);
        assert_eq!(outcome.summary.pool.live, 0);

        let mut rendered = Vec::new();
        write_report(&mut rendered, "in.fq", 33, &outcome.stats).unwrap();
        reports.push(String::from_utf8(rendered).unwrap());
        accumulators.push(outcome.stats);
    }

    for accumulator in &accumulators[1..] {
        assert_eq!(&accumulators[0], accumulator);
    }
    for report in &reports[1..] {
        assert_eq!(&reports[0], report);
    }
}

#[test]
fn test_report_totals_for_known_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    // 2 reads x 4 bases: all bases Q40 except position 4 of r2 (Q0).
    let records = vec![
        ("r1".to_string(), "ACGT".to_string(), "IIII".to_string()),
        ("r2".to_string(), "ACGN".to_string(), "III!".to_string()),
    ];
    write_fastq(&input, &fastq_text(&records));

    let outcome = StatisticsPipeline::new(stat_config(&input, 10, 2)).run().unwrap();
    let mut rendered = Vec::new();
    write_report(&mut rendered, "in.fq", 33, &outcome.stats).unwrap();
    let report = String::from_utf8(rendered).unwrap();

    assert!(report.contains("#ReadNum\t2\n"));
    assert!(report.contains("#ReadLength\t4\n"));
    assert!(report.contains("#BaseCount\t8\n"));
    // 7 of 8 bases are >= Q20/Q30
    assert!(report.contains("#Q20(>=20)\t7\t87.50%\n"));
    assert!(report.contains("#Q30(>=30)\t7\t87.50%\n"));
    assert!(report.contains("#A\t2\t25.00%\n"));
    assert!(report.contains("#N\t1\t12.50%\n"));
    assert!(report.contains("#GC\t4\t50.00%\n"));
    // Position 4: one T, one N; average quality (40 + 0) / 2.
    assert!(report.lines().any(|l| l == "4\t0\t0\t0\t1\t1\t20.00\t0.50"));
}

#[test]
fn test_gzip_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq.gz");
    let records = random_records(200, 10, 7);
    write_fastq(&input, &fastq_text(&records));

    let outcome = StatisticsPipeline::new(stat_config(&input, 16, 4)).run().unwrap();
    assert_eq!(outcome.stats.total_reads(), 200);
    assert_eq!(outcome.stats.read_length(), 10);
    assert!(outcome.summary.bytes_read.unwrap() > 0);
}

#[test]
fn test_phred64_offset_decoding() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    // 'h' = 104, so Q40 under Phred+64
    let records = vec![("r1".to_string(), "ACGT".to_string(), "hhhh".to_string())];
    write_fastq(&input, &fastq_text(&records));

    let config = stat_config(&input, 10, 1).with_phred_offset(64);
    let outcome = StatisticsPipeline::new(config).run().unwrap();
    assert_eq!(outcome.stats.qual_count(0, 40), 1);
    assert!((outcome.stats.average_quality_at(0) - 40.0).abs() < 1e-9);
}
