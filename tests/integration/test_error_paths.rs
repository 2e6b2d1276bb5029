//! Failure behaviour: configuration rejection, malformed input, mate
//! desync, and fixed-read-length enforcement.

use fqflow_lib::config::PipelineConfig;
use fqflow_lib::errors::FqflowError;
use fqflow_lib::pipeline::{ProcessingPipeline, StatisticsPipeline};
use tempfile::TempDir;

use crate::helpers::{fastq_text, write_fastq};

#[test]
fn test_missing_input_path_is_config_error() {
    let error = ProcessingPipeline::new(PipelineConfig::default()).run().unwrap_err();
    assert!(matches!(error, FqflowError::Config { .. }));
}

#[test]
fn test_missing_output_path_is_config_error() {
    let error = ProcessingPipeline::new(PipelineConfig::new("in.fq")).run().unwrap_err();
    assert!(matches!(error, FqflowError::Config { .. }));
}

#[test]
fn test_bad_token_budget_is_config_error() {
    let config = PipelineConfig::new("in.fq").with_output("out.fq").with_token_budget(1);
    let error = ProcessingPipeline::new(config).run().unwrap_err();
    assert!(matches!(error, FqflowError::Config { .. }));
}

#[test]
fn test_pool_smaller_than_tokens_is_config_error() {
    let config = PipelineConfig::new("in.fq")
        .with_output("out.fq")
        .with_token_budget(8)
        .with_pool_capacity(4);
    let error = ProcessingPipeline::new(config).run().unwrap_err();
    assert!(matches!(error, FqflowError::Config { .. }));
}

#[test]
fn test_nonexistent_input_is_source_error() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::new(dir.path().join("missing.fq"))
        .with_output(dir.path().join("out.fq"));
    let error = ProcessingPipeline::new(config).run().unwrap_err();
    assert!(matches!(error, FqflowError::Source { .. }));
}

#[test]
fn test_malformed_fastq_is_source_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let output = dir.path().join("out.fq");
    std::fs::write(&input, "@r1\nACGT\nIIII\n").unwrap(); // missing separator line

    let config = PipelineConfig::new(&input).with_output(&output).with_workers(2);
    let error = ProcessingPipeline::new(config).run().unwrap_err();
    assert!(matches!(error, FqflowError::Source { .. }));
}

#[test]
fn test_mate_desync_is_source_error() {
    let dir = TempDir::new().unwrap();
    let r1 = dir.path().join("r1.fq");
    let r2 = dir.path().join("r2.fq");
    let output = dir.path().join("out.fq");
    let two = vec![
        ("a/1".to_string(), "ACGT".to_string(), "IIII".to_string()),
        ("b/1".to_string(), "ACGT".to_string(), "IIII".to_string()),
    ];
    let one = vec![("a/2".to_string(), "ACGT".to_string(), "IIII".to_string())];
    write_fastq(&r1, &fastq_text(&two));
    write_fastq(&r2, &fastq_text(&one));

    let config = PipelineConfig::new(&r1).with_mate(&r2).with_output(&output).with_workers(2);
    let error = ProcessingPipeline::new(config).run().unwrap_err();
    match error {
        FqflowError::Source { reason } => assert!(reason.contains("mate desync"), "{reason}"),
        other => panic!("expected a source error, got {other}"),
    }
}

#[test]
fn test_variable_read_length_fails_statistics() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let records = vec![
        ("r1".to_string(), "ACGT".to_string(), "IIII".to_string()),
        ("r2".to_string(), "ACGTACGT".to_string(), "IIIIIIII".to_string()),
    ];
    write_fastq(&input, &fastq_text(&records));

    for workers in [1usize, 4] {
        let config = PipelineConfig::new(&input).with_workers(workers);
        let error = StatisticsPipeline::new(config).run().unwrap_err();
        assert!(
            matches!(error, FqflowError::VariableReadLength { .. }),
            "workers={workers}"
        );
    }
}

#[test]
fn test_variable_read_length_is_fine_for_filtering() {
    // Only the statistics pipeline needs fixed-length reads.
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let output = dir.path().join("out.fq");
    let records = vec![
        ("r1".to_string(), "ACGT".to_string(), "IIII".to_string()),
        ("r2".to_string(), "ACGTACGT".to_string(), "IIIIIIII".to_string()),
    ];
    let text = fastq_text(&records);
    write_fastq(&input, &text);

    let config = PipelineConfig::new(&input).with_output(&output).with_workers(4);
    let summary = ProcessingPipeline::new(config).run().unwrap();
    assert_eq!(summary.records_passed, 2);
    assert_eq!(crate::helpers::read_fastq(&output), text);
}
