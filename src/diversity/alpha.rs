//! Wide-to-long reshaping of alpha-diversity exports.
//!
//! The upstream exporter writes one wide CSV per metric whose observation
//! columns encode a (rarefaction depth, iteration) pair in the column name,
//! e.g. `depth-1000_iter-3`. Reshaping decodes those keys into a normalized
//! relation of one row per (sample, depth, iteration), carrying any metadata
//! columns through unchanged.

use crate::error::{QcError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

/// Matches an observation column name, capturing depth and iteration.
fn column_key_regex() -> &'static Regex {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    KEY_RE.get_or_init(|| Regex::new(r"^depth-(\d+)_iter-(\d+)$").unwrap())
}

/// One long-form alpha-diversity observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaObservation {
    pub sample_id: String,
    pub depth: u64,
    pub iteration: u32,
    /// NaN when the wide cell was empty.
    pub value: f64,
    /// Metadata values in [`AlphaLong::metadata_columns`] order.
    pub metadata: Vec<String>,
}

/// Long-form alpha-diversity table for one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaLong {
    pub metric: String,
    /// Non-observation columns copied through from the wide table.
    pub metadata_columns: Vec<String>,
    pub rows: Vec<AlphaObservation>,
    /// Distinct depths in ascending order.
    pub depths: Vec<u64>,
    /// Distinct iteration indices in ascending order.
    pub iterations: Vec<u32>,
}

impl AlphaLong {
    /// Number of samples in the source table.
    pub fn n_samples(&self) -> usize {
        let depth_iters = self.depths.len() * self.iterations.len();
        if depth_iters == 0 {
            0
        } else {
            self.rows.len() / depth_iters
        }
    }

    /// Write the long table as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);

        write!(writer, "sample_id\tdepth\titeration\t{}", self.metric)?;
        for col in &self.metadata_columns {
            write!(writer, "\t{}", col)?;
        }
        writeln!(writer)?;
        for row in &self.rows {
            write!(
                writer,
                "{}\t{}\t{}\t{}",
                row.sample_id, row.depth, row.iteration, row.value
            )?;
            for value in &row.metadata {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Reshape a wide per-metric alpha-diversity CSV into long form.
///
/// The first column holds sample ids. Header names are lowercased before
/// matching; a column named `depth-<d>_iter-<i>` is an observation column and
/// anything else is metadata. The output is the exact cross product of
/// depths × iterations × samples: empty observation cells become NaN rows,
/// while non-empty unparsable cells are fatal. Duplicate (depth, iteration)
/// header keys are rejected.
pub fn reshape_alpha<P: AsRef<Path>>(path: P, metric: &str) -> Result<AlphaLong> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    if headers.len() < 2 {
        return Err(QcError::EmptyData(format!(
            "Alpha table {} has no observation columns",
            path.display()
        )));
    }

    let key_re = column_key_regex();
    let mut observation_cols: Vec<(usize, u64, u32)> = Vec::new();
    let mut metadata_cols: Vec<(usize, String)> = Vec::new();
    let mut seen_keys = HashSet::new();
    for (idx, name) in headers.iter().enumerate().skip(1) {
        if let Some(caps) = key_re.captures(name) {
            let depth: u64 = caps[1].parse().map_err(|_| QcError::InvalidValue {
                value: name.clone(),
                row: 0,
                column: name.clone(),
                path: path.to_path_buf(),
            })?;
            let iteration: u32 = caps[2].parse().map_err(|_| QcError::InvalidValue {
                value: name.clone(),
                row: 0,
                column: name.clone(),
                path: path.to_path_buf(),
            })?;
            if !seen_keys.insert((depth, iteration)) {
                return Err(QcError::InvalidParameter(format!(
                    "Duplicate alpha column key depth-{}_iter-{} in {}",
                    depth,
                    iteration,
                    path.display()
                )));
            }
            observation_cols.push((idx, depth, iteration));
        } else {
            metadata_cols.push((idx, name.clone()));
        }
    }
    if observation_cols.is_empty() {
        return Err(QcError::EmptyData(format!(
            "No depth/iteration columns in {}",
            path.display()
        )));
    }

    let mut depths: Vec<u64> = observation_cols.iter().map(|&(_, d, _)| d).collect();
    depths.sort_unstable();
    depths.dedup();
    let mut iterations: Vec<u32> = observation_cols.iter().map(|&(_, _, i)| i).collect();
    iterations.sort_unstable();
    iterations.dedup();
    // Duplicates are already rejected, so a count mismatch means some
    // (depth, iteration) cell of the grid has no column and the output could
    // not be the full cross product.
    if observation_cols.len() != depths.len() * iterations.len() {
        return Err(QcError::InvalidParameter(format!(
            "Observation columns in {} do not form a full depth x iteration grid: \
             {} columns for {} depths x {} iterations",
            path.display(),
            observation_cols.len(),
            depths.len(),
            iterations.len()
        )));
    }

    let mut rows = Vec::new();
    let mut sample_ids = HashSet::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let sample_id = record
            .get(0)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if sample_id.is_empty() {
            continue;
        }
        if !sample_ids.insert(sample_id.clone()) {
            return Err(QcError::SampleMismatch(format!(
                "Duplicate sample ID '{}' in {}",
                sample_id,
                path.display()
            )));
        }

        let metadata: Vec<String> = metadata_cols
            .iter()
            .map(|&(idx, _)| record.get(idx).unwrap_or("").trim().to_string())
            .collect();

        for &(idx, depth, iteration) in &observation_cols {
            let cell = record.get(idx).unwrap_or("").trim();
            let value = if cell.is_empty() {
                f64::NAN
            } else {
                cell.parse().map_err(|_| QcError::InvalidValue {
                    value: cell.to_string(),
                    row: row_idx,
                    column: headers[idx].clone(),
                    path: path.to_path_buf(),
                })?
            };
            rows.push(AlphaObservation {
                sample_id: sample_id.clone(),
                depth,
                iteration,
                value,
                metadata: metadata.clone(),
            });
        }
    }
    if rows.is_empty() {
        return Err(QcError::EmptyData(format!(
            "No samples in {}",
            path.display()
        )));
    }

    Ok(AlphaLong {
        metric: metric.to_string(),
        metadata_columns: metadata_cols.into_iter().map(|(_, name)| name).collect(),
        rows,
        depths,
        iterations,
    })
}
