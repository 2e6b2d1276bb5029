//! Statistics report rendering.
//!
//! Writes a [`PositionStats`] accumulator in the tab-separated fqStat
//! layout: header lines with whole-file totals, then one row per read
//! position. Percentages and per-position values are printed with two
//! decimal places.

use std::io::Write;

use crate::stats::PositionStats;

const Q20_THRESHOLD: usize = 20;
const Q30_THRESHOLD: usize = 30;

fn percent(count: u64, total: u64) -> f64 {
    if total == 0 { 0.0 } else { 100.0 * count as f64 / total as f64 }
}

/// Writes the statistics report for one input.
///
/// `name` is the display name of the input (usually the file's basename)
/// and `phred_offset` the encoding the qualities were decoded with.
/// An empty accumulator produces an empty report.
///
/// # Errors
///
/// Propagates I/O errors from the writer.
pub fn write_report<W: Write>(
    writer: &mut W,
    name: &str,
    phred_offset: u8,
    stats: &PositionStats,
) -> std::io::Result<()> {
    let n_base = stats.base_count();
    if n_base == 0 {
        log::warn!("No reads tallied; statistics report is empty");
        return Ok(());
    }

    writeln!(writer, "#Name\t{name}")?;
    writeln!(writer, "#PhredQual\t{phred_offset}")?;
    writeln!(writer, "#ReadNum\t{}", stats.total_reads())?;
    writeln!(writer, "#ReadLength\t{}", stats.read_length())?;
    writeln!(writer, "#BaseCount\t{n_base}")?;

    let n_q20 = stats.bases_at_or_above(Q20_THRESHOLD);
    let n_q30 = stats.bases_at_or_above(Q30_THRESHOLD);
    writeln!(writer, "#Q20(>=20)\t{n_q20}\t{:.2}%", percent(n_q20, n_base))?;
    writeln!(writer, "#Q30(>=30)\t{n_q30}\t{:.2}%", percent(n_q30, n_base))?;

    let totals: Vec<u64> = (0..5).map(|column| stats.base_total(column)).collect();
    for (label, &count) in ["#A", "#C", "#G", "#T", "#N"].iter().zip(&totals) {
        writeln!(writer, "{label}\t{count}\t{:.2}%", percent(count, n_base))?;
    }
    let gc = totals[1] + totals[2];
    writeln!(writer, "#GC\t{gc}\t{:.2}%", percent(gc, n_base))?;

    writeln!(writer, "#Pos\tA\tC\tG\tT\tN\tAvgQual\tErrRate")?;
    for pos in 0..stats.read_length() {
        write!(writer, "{}", pos + 1)?;
        for column in 0..5 {
            write!(writer, "\t{}", stats.base_count_at(pos, column))?;
        }
        writeln!(
            writer,
            "\t{:.2}\t{:.2}",
            stats.average_quality_at(pos),
            stats.error_rate_at(pos)
        )?;
    }
    Ok(())
}
