//! Sampling-depth retention sweep for rarefaction threshold selection.

use crate::error::{QcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::data::FeatureTotals;

/// Retention statistics at one candidate sampling depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RarefactionRow {
    /// Candidate sampling depth.
    pub depth: u64,
    /// Percentage of samples whose total exceeds the depth.
    pub percent_samples: f64,
    /// Approximate percentage of total sequence mass kept when every
    /// retained sample is subsampled to exactly this depth.
    pub percent_seqs: f64,
    /// Percentage of blank samples retained; `None` when no blanks exist.
    pub percent_blanks: Option<f64>,
    /// Samples excluded at this depth, sorted lexicographically.
    pub excluded: Vec<String>,
}

/// Retention sweep over an ascending sequence of candidate depths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RarefactionSweep {
    pub rows: Vec<RarefactionRow>,
}

impl RarefactionSweep {
    /// Write the sweep as a TSV table.
    pub fn to_tsv<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);

        writeln!(
            writer,
            "depth\tpercent_samples\tpercent_seqs\tpercent_blanks\texcluded"
        )?;
        for row in &self.rows {
            writeln!(
                writer,
                "{}\t{:.2}\t{:.2}\t{}\t{}",
                row.depth,
                row.percent_samples,
                row.percent_seqs,
                row.percent_blanks
                    .map(|p| format!("{:.2}", p))
                    .unwrap_or_else(|| "NA".to_string()),
                row.excluded.join(",")
            )?;
        }
        Ok(())
    }
}

/// Sweep candidate sampling depths over per-sample feature totals.
///
/// A sample is retained at depth `t` when its total is strictly greater than
/// `t`. The blank percentage is `None` when `blanks` names no sample present
/// in the totals. Thresholds must be strictly increasing, which makes the
/// sample and blank percentages non-increasing across rows.
pub fn rarefaction_sweep(
    totals: &FeatureTotals,
    depths: &[u64],
    blanks: &[String],
) -> Result<RarefactionSweep> {
    if depths.is_empty() {
        return Err(QcError::InvalidParameter(
            "No candidate sampling depths given".to_string(),
        ));
    }
    if depths.windows(2).any(|w| w[0] >= w[1]) {
        return Err(QcError::InvalidParameter(
            "Candidate sampling depths must be strictly increasing".to_string(),
        ));
    }

    let blank_set: HashSet<&str> = blanks
        .iter()
        .map(String::as_str)
        .filter(|sid| totals.get(sid).is_some())
        .collect();
    let n_samples = totals.n_samples();
    let n_blanks = blank_set.len();
    let total_seqs = totals.sum();

    let rows = depths
        .iter()
        .map(|&depth| {
            let mut excluded = Vec::new();
            let mut n_retained = 0usize;
            let mut blanks_retained = 0usize;
            for (sid, total) in totals.iter() {
                if total > depth {
                    n_retained += 1;
                    if blank_set.contains(sid) {
                        blanks_retained += 1;
                    }
                } else {
                    excluded.push(sid.to_string());
                }
            }
            excluded.sort();

            let percent_samples = n_retained as f64 / n_samples as f64 * 100.0;
            let percent_seqs = if total_seqs > 0 {
                (n_retained as u64 * depth) as f64 / total_seqs as f64 * 100.0
            } else {
                0.0
            };
            let percent_blanks = if n_blanks > 0 {
                Some(blanks_retained as f64 / n_blanks as f64 * 100.0)
            } else {
                None
            };

            RarefactionRow {
                depth,
                percent_samples,
                percent_seqs,
                percent_blanks,
                excluded,
            }
        })
        .collect();

    Ok(RarefactionSweep { rows })
}
