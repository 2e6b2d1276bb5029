//! Phred quality score utilities.
//!
//! FASTQ qualities are ASCII-encoded Phred scores with an offset of 33
//! (Sanger) or 64 (Illumina 1.3+). The engine is offset-agnostic; the
//! offset is carried in the configuration and passed down to whatever
//! needs to decode qualities (the built-in quality predicate and trimmer,
//! and the statistics fold).

/// Phred+33 (Sanger) quality encoding offset
pub const PHRED_OFFSET_SANGER: u8 = 33;

/// Phred+64 (Illumina 1.3+) quality encoding offset
pub const PHRED_OFFSET_ILLUMINA: u8 = 64;

/// Highest Phred score the engine accepts when validating quality strings
/// (Q93, the ceiling of the ASCII-printable range for Phred+33)
pub const MAX_PHRED: u8 = 93;

/// Returns true for the two supported quality encoding offsets.
#[inline]
#[must_use]
pub fn is_supported_offset(offset: u8) -> bool {
    offset == PHRED_OFFSET_SANGER || offset == PHRED_OFFSET_ILLUMINA
}

/// Converts a Phred score to its probability of error.
///
/// Phred score Q relates to error probability P by `Q = -10 * log10(P)`,
/// so `P = 10^(-Q/10)`.
///
/// # Examples
/// ```
/// use fqflow_lib::phred::error_probability;
///
/// assert!((error_probability(10) - 0.1).abs() < 1e-12);
/// assert!((error_probability(20) - 0.01).abs() < 1e-12);
/// assert!((error_probability(30) - 0.001).abs() < 1e-12);
/// ```
#[inline]
#[must_use]
pub fn error_probability(phred: u8) -> f64 {
    10f64.powf(-0.1 * f64::from(phred))
}

/// Decodes one ASCII quality byte into a Phred score.
///
/// Bytes below the offset decode to 0 rather than wrapping.
#[inline]
#[must_use]
pub fn decode_quality(byte: u8, offset: u8) -> u8 {
    byte.saturating_sub(offset)
}

/// Mean Phred score of an ASCII-encoded quality string.
///
/// Returns 0.0 for an empty string; divisions never fail.
///
/// # Examples
/// ```
/// use fqflow_lib::phred::{average_quality, PHRED_OFFSET_SANGER};
///
/// // 'I' is Q40 in Phred+33
/// assert!((average_quality(b"IIII", PHRED_OFFSET_SANGER) - 40.0).abs() < f64::EPSILON);
/// // '!' is Q0
/// assert!(average_quality(b"!!!!", PHRED_OFFSET_SANGER).abs() < f64::EPSILON);
/// ```
#[must_use]
pub fn average_quality(qual: &[u8], offset: u8) -> f64 {
    if qual.is_empty() {
        return 0.0;
    }
    let sum: u64 = qual.iter().map(|&b| u64::from(decode_quality(b, offset))).sum();
    sum as f64 / qual.len() as f64
}

/// Checks that every byte of a quality string decodes to a Phred score in
/// `[0, MAX_PHRED]` under the given offset.
#[must_use]
pub fn is_valid_quality(qual: &[u8], offset: u8) -> bool {
    qual.iter().all(|&b| b >= offset && b - offset <= MAX_PHRED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_probability_matches_phred_definition() {
        for q in [0u8, 10, 20, 30, 40] {
            let expected = 10f64.powi(-i32::from(q) / 10);
            assert!((error_probability(q) - expected).abs() < 1e-12, "Q{q}");
        }
    }

    #[test]
    fn test_decode_quality_saturates() {
        assert_eq!(decode_quality(b'I', PHRED_OFFSET_SANGER), 40);
        assert_eq!(decode_quality(b'!', PHRED_OFFSET_SANGER), 0);
        // Byte below the offset must not wrap around
        assert_eq!(decode_quality(b' ', PHRED_OFFSET_SANGER), 0);
    }

    #[test]
    fn test_average_quality() {
        assert!((average_quality(b"II!!", PHRED_OFFSET_SANGER) - 20.0).abs() < f64::EPSILON);
        assert!(average_quality(b"", PHRED_OFFSET_SANGER).abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_valid_quality() {
        assert!(is_valid_quality(b"IIII", PHRED_OFFSET_SANGER));
        assert!(is_valid_quality(b"!!!!", PHRED_OFFSET_SANGER));
        // Space (0x20) is below Phred+33
        assert!(!is_valid_quality(b" III", PHRED_OFFSET_SANGER));
        // 'I' (0x49) is below the Illumina 1.3+ offset
        assert!(!is_valid_quality(b"IIII", PHRED_OFFSET_ILLUMINA));
    }

    #[test]
    fn test_supported_offsets() {
        assert!(is_supported_offset(33));
        assert!(is_supported_offset(64));
        assert!(!is_supported_offset(59));
    }
}
