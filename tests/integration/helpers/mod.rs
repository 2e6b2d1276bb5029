//! Helper utilities for integration tests.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A minimal in-test record representation: (id, seq, qual).
pub type TestRecord = (String, String, String);

/// Renders records as canonical four-line FASTQ text.
pub fn fastq_text(records: &[TestRecord]) -> String {
    let mut text = String::new();
    for (id, seq, qual) in records {
        text.push('@');
        text.push_str(id);
        text.push('\n');
        text.push_str(seq);
        text.push_str("\n+\n");
        text.push_str(qual);
        text.push('\n');
    }
    text
}

/// Writes text to a file, gzip-compressing when the name ends in `.gz`.
pub fn write_fastq(path: &Path, text: &str) {
    if path.extension().is_some_and(|e| e == "gz") {
        let mut encoder =
            GzEncoder::new(File::create(path).unwrap(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    } else {
        std::fs::write(path, text).unwrap();
    }
}

/// Reads a file back to text, transparently decompressing `.gz`.
pub fn read_fastq(path: &Path) -> String {
    let mut text = String::new();
    if path.extension().is_some_and(|e| e == "gz") {
        MultiGzDecoder::new(File::open(path).unwrap()).read_to_string(&mut text).unwrap();
    } else {
        File::open(path).unwrap().read_to_string(&mut text).unwrap();
    }
    text
}

/// Generates `count` fixed-length records with seeded random bases and
/// qualities in the printable Phred+33 range Q0..=Q40.
pub fn random_records(count: usize, read_length: usize, seed: u64) -> Vec<TestRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bases = [b'A', b'C', b'G', b'T'];
    (0..count)
        .map(|i| {
            let seq: String =
                (0..read_length).map(|_| bases[rng.gen_range(0..4)] as char).collect();
            let qual: String =
                (0..read_length).map(|_| (33 + rng.gen_range(0..=40u8)) as char).collect();
            (format!("read_{i}"), seq, qual)
        })
        .collect()
}

/// The four-record fixture used across scenarios.
pub fn four_record_fixture() -> Vec<TestRecord> {
    vec![
        ("r1".to_string(), "ACGT".to_string(), "IIII".to_string()),
        ("r2".to_string(), "ACGTACGT".to_string(), "IIIIIIII".to_string()),
        ("r3".to_string(), "A".to_string(), "I".to_string()),
        ("r4".to_string(), "TTTT".to_string(), "!!!!".to_string()),
    ]
}
