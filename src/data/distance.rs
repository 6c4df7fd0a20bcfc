//! Labeled pairwise distance matrices.

use crate::error::{QcError, Result};
use nalgebra::DMatrix;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Absolute tolerance for symmetry and zero-diagonal checks.
const MATRIX_TOL: f64 = 1e-8;

/// A square, symmetric, hollow matrix of pairwise sample distances.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    sample_ids: Vec<String>,
    data: DMatrix<f64>,
}

impl DistanceMatrix {
    /// Create a distance matrix, validating its invariants.
    pub fn new(sample_ids: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        if let Err(reason) = validate(&sample_ids, &data) {
            return Err(QcError::InvalidParameter(format!(
                "Invalid distance matrix: {}",
                reason
            )));
        }
        Ok(Self { sample_ids, data })
    }

    /// Load a distance matrix from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with sample IDs (first cell is a corner label)
    /// - Subsequent rows: sample ID followed by one distance per header ID,
    ///   with row labels in header order
    ///
    /// Asymmetry, a non-zero diagonal, negative entries, or ragged rows are
    /// all fatal.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| QcError::EmptyData(format!("Empty distance matrix {}", path.display())))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(QcError::EmptyData(format!(
                "Distance matrix {} has no samples",
                path.display()
            )));
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();
        let n = sample_ids.len();

        let mut data = DMatrix::zeros(n, n);
        let mut row_idx = 0;
        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            if row_idx >= n {
                return Err(QcError::MalformedMatrix {
                    path: path.to_path_buf(),
                    reason: format!("More rows than the {} header samples", n),
                });
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let label = fields[0].trim();
            if label != sample_ids[row_idx] {
                return Err(QcError::MalformedMatrix {
                    path: path.to_path_buf(),
                    reason: format!(
                        "Row label '{}' does not match header sample '{}'",
                        label, sample_ids[row_idx]
                    ),
                });
            }
            if fields.len() != n + 1 {
                return Err(QcError::MalformedMatrix {
                    path: path.to_path_buf(),
                    reason: format!(
                        "Row '{}' has {} values, expected {}",
                        label,
                        fields.len() - 1,
                        n
                    ),
                });
            }
            for (col_idx, raw) in fields[1..].iter().enumerate() {
                let value: f64 = raw.trim().parse().map_err(|_| QcError::InvalidValue {
                    value: raw.to_string(),
                    row: row_idx,
                    column: sample_ids[col_idx].clone(),
                    path: path.to_path_buf(),
                })?;
                data[(row_idx, col_idx)] = value;
            }
            row_idx += 1;
        }
        if row_idx != n {
            return Err(QcError::MalformedMatrix {
                path: path.to_path_buf(),
                reason: format!("Found {} rows, expected {}", row_idx, n),
            });
        }

        if let Err(reason) = validate(&sample_ids, &data) {
            return Err(QcError::MalformedMatrix {
                path: path.to_path_buf(),
                reason,
            });
        }
        Ok(Self { sample_ids, data })
    }

    /// Number of samples.
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Sample IDs in matrix order.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Distance between two samples by index.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    /// The underlying dense matrix.
    #[inline]
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }
}

fn validate(sample_ids: &[String], data: &DMatrix<f64>) -> std::result::Result<(), String> {
    let n = sample_ids.len();
    if data.nrows() != n || data.ncols() != n {
        return Err(format!(
            "Matrix is {}x{} but there are {} sample IDs",
            data.nrows(),
            data.ncols(),
            n
        ));
    }
    for i in 0..n {
        if data[(i, i)].abs() > MATRIX_TOL {
            return Err(format!(
                "Non-zero diagonal at '{}': {}",
                sample_ids[i],
                data[(i, i)]
            ));
        }
        for j in 0..n {
            let d = data[(i, j)];
            if !d.is_finite() || d < -MATRIX_TOL {
                return Err(format!(
                    "Negative or non-finite distance at ('{}', '{}'): {}",
                    sample_ids[i], sample_ids[j], d
                ));
            }
            if (d - data[(j, i)]).abs() > MATRIX_TOL {
                return Err(format!(
                    "Asymmetry at ('{}', '{}'): {} vs {}",
                    sample_ids[i],
                    sample_ids[j],
                    d,
                    data[(j, i)]
                ));
            }
        }
    }
    Ok(())
}
