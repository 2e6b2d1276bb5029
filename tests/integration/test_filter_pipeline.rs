//! End-to-end processing pipeline scenarios over real files.

use fqflow_lib::config::PipelineConfig;
use fqflow_lib::pipeline::ProcessingPipeline;
use fqflow_lib::predicate::{MinLengthPredicate, MinQualityPredicate};
use fqflow_lib::mutator::LengthTrimmer;
use tempfile::TempDir;

use crate::helpers::{fastq_text, four_record_fixture, read_fastq, write_fastq};

fn base_config(input: &std::path::Path, output: &std::path::Path) -> PipelineConfig {
    PipelineConfig::new(input)
        .with_output(output)
        .with_batch_size(2)
        .with_workers(4)
        .with_token_budget(4)
        .with_pool_capacity(8)
}

#[test]
fn test_empty_input_creates_empty_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let output = dir.path().join("out.fq");
    write_fastq(&input, "");

    let summary = ProcessingPipeline::new(base_config(&input, &output)).run().unwrap();

    assert_eq!(summary.records_in, 0);
    assert_eq!(summary.pool.live, 0);
    assert!(output.exists());
    assert_eq!(read_fastq(&output), "");
}

#[test]
fn test_identity_pipeline_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let output = dir.path().join("out.fq");
    let text = fastq_text(&four_record_fixture());
    write_fastq(&input, &text);

    let summary = ProcessingPipeline::new(base_config(&input, &output)).run().unwrap();

    assert_eq!(summary.records_in, 4);
    assert_eq!(summary.records_passed, 4);
    assert_eq!(read_fastq(&output), text);
}

#[test]
fn test_min_quality_predicate_drops_low_quality_read() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let output = dir.path().join("out.fq");
    write_fastq(&input, &fastq_text(&four_record_fixture()));

    let mut pipeline = ProcessingPipeline::new(base_config(&input, &output));
    pipeline.add_predicate(Box::new(MinQualityPredicate::new(30.0, 33).unwrap()));
    let summary = pipeline.run().unwrap();

    // r4 has average quality 0; everything else is Q40.
    assert_eq!(summary.records_filtered, 1);
    assert_eq!(summary.records_passed, 3);
    let expected = fastq_text(&four_record_fixture()[..3]);
    assert_eq!(read_fastq(&output), expected);
}

#[test]
fn test_predicate_runs_before_mutator() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let output = dir.path().join("out.fq");
    let records = vec![
        ("r2".to_string(), "ACGTACGT".to_string(), "IIIIIIII".to_string()),
        ("r3".to_string(), "A".to_string(), "I".to_string()),
    ];
    write_fastq(&input, &fastq_text(&records));

    let mut pipeline = ProcessingPipeline::new(base_config(&input, &output));
    pipeline.add_predicate(Box::new(MinLengthPredicate::new(4)));
    pipeline.add_mutator(Box::new(LengthTrimmer::trim_right(2)));
    let summary = pipeline.run().unwrap();

    // r2 passes the predicate at its original length, then gets trimmed;
    // the trim does not retroactively re-apply the predicate. r3 is
    // filtered before any mutation.
    assert_eq!(summary.records_filtered, 1);
    assert_eq!(summary.records_passed, 1);
    assert_eq!(summary.records_modified, 1);
    assert_eq!(read_fastq(&output), "@r2\nACGTAC\n+\nIIIIII\n");
}

#[test]
fn test_gzip_roundtrip() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq.gz");
    let output = dir.path().join("out.fq.gz");
    let text = fastq_text(&four_record_fixture());
    write_fastq(&input, &text);

    let summary = ProcessingPipeline::new(base_config(&input, &output)).run().unwrap();

    assert_eq!(summary.records_in, 4);
    // Gzip source reports decompressed bytes.
    assert_eq!(summary.bytes_read, Some(text.len() as u64));
    assert_eq!(read_fastq(&output), text);
}

#[test]
fn test_paired_end_interleaved_output() {
    let dir = TempDir::new().unwrap();
    let r1 = dir.path().join("r1.fq");
    let r2 = dir.path().join("r2.fq");
    let output = dir.path().join("out.fq");

    let mates1 = vec![
        ("a/1".to_string(), "ACGT".to_string(), "IIII".to_string()),
        ("b/1".to_string(), "GGGG".to_string(), "!!!!".to_string()),
        ("c/1".to_string(), "TTTT".to_string(), "IIII".to_string()),
    ];
    let mates2 = vec![
        ("a/2".to_string(), "TTTT".to_string(), "IIII".to_string()),
        ("b/2".to_string(), "CCCC".to_string(), "IIII".to_string()),
        ("c/2".to_string(), "AAAA".to_string(), "IIII".to_string()),
    ];
    write_fastq(&r1, &fastq_text(&mates1));
    write_fastq(&r2, &fastq_text(&mates2));

    let config = PipelineConfig::new(&r1)
        .with_mate(&r2)
        .with_output(&output)
        .with_batch_size(2)
        .with_workers(4)
        .with_token_budget(4)
        .with_pool_capacity(8);
    let mut pipeline = ProcessingPipeline::new(config);
    // Pair b is rejected as a unit: mate 1 fails the quality threshold.
    pipeline.add_predicate(Box::new(MinQualityPredicate::new(30.0, 33).unwrap()));
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.records_in, 6);
    assert_eq!(summary.records_filtered, 2);
    assert_eq!(summary.records_passed, 4);
    assert_eq!(
        read_fastq(&output),
        "@a/1\nACGT\n+\nIIII\n@a/2\nTTTT\n+\nIIII\n@c/1\nTTTT\n+\nIIII\n@c/2\nAAAA\n+\nIIII\n"
    );
}

#[test]
fn test_sequential_and_parallel_outputs_are_identical() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let records = crate::helpers::random_records(500, 30, 11);
    write_fastq(&input, &fastq_text(&records));

    let mut outputs = Vec::new();
    for workers in [1usize, 6] {
        let output = dir.path().join(format!("out_{workers}.fq"));
        let config = PipelineConfig::new(&input)
            .with_output(&output)
            .with_batch_size(7)
            .with_workers(workers)
            .with_token_budget(4)
            .with_pool_capacity(8);
        let mut pipeline = ProcessingPipeline::new(config);
        pipeline.add_predicate(Box::new(MinQualityPredicate::new(18.0, 33).unwrap()));
        pipeline.add_mutator(Box::new(LengthTrimmer::trim_right(3)));
        pipeline.run().unwrap();
        outputs.push(read_fastq(&output));
    }

    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_memory_pool_disabled_still_correct() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.fq");
    let output = dir.path().join("out.fq");
    let text = fastq_text(&four_record_fixture());
    write_fastq(&input, &text);

    let mut config = base_config(&input, &output);
    config.enable_memory_pool = false;
    let summary = ProcessingPipeline::new(config).run().unwrap();

    assert_eq!(summary.pool.hits, 0);
    assert!(summary.pool.misses > 0);
    assert_eq!(read_fastq(&output), text);
}
