//! Per-level taxonomic abundance tables with sparse storage.

use crate::error::{QcError, Result};
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Relative abundances are expressed as percentages.
const PERCENT_SCALE: f64 = 100.0;

/// A sparse abundance table for one taxonomic level.
///
/// Rows are samples, columns are taxa at the collapsed level. Values are
/// non-negative counts stored in CSR format for row-wise operations.
#[derive(Debug, Clone)]
pub struct AbundanceTable {
    /// Taxonomic level this table was collapsed to (2 = phylum .. 7 = species).
    level: u32,
    /// Sparse matrix in CSR format (samples × taxa).
    data: CsMat<f64>,
    /// Sample identifiers (row names).
    sample_ids: Vec<String>,
    /// Taxon lineage strings (column names).
    taxon_ids: Vec<String>,
}

impl AbundanceTable {
    /// Create a table from a sparse matrix and identifiers.
    pub fn new(
        level: u32,
        data: CsMat<f64>,
        sample_ids: Vec<String>,
        taxon_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != sample_ids.len() {
            return Err(QcError::DimensionMismatch {
                expected: nrows,
                actual: sample_ids.len(),
            });
        }
        if ncols != taxon_ids.len() {
            return Err(QcError::DimensionMismatch {
                expected: ncols,
                actual: taxon_ids.len(),
            });
        }
        if data.iter().any(|(&val, _)| val < 0.0) {
            return Err(QcError::InvalidParameter(
                "Abundance counts must be non-negative".to_string(),
            ));
        }
        Ok(Self {
            level,
            data,
            sample_ids,
            taxon_ids,
        })
    }

    /// Load a per-level table from a comma-delimited export.
    ///
    /// Expected format:
    /// - First column: sample ID
    /// - Remaining columns: taxon counts, possibly interleaved with metadata
    ///   columns appended by the upstream pipeline
    ///
    /// A column is kept as a taxon column only if every non-empty cell parses
    /// as a finite number; other columns are metadata and are dropped, as are
    /// columns with no values at all. Negative counts are rejected.
    pub fn from_csv<P: AsRef<Path>>(path: P, level: u32) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.len() < 2 {
            return Err(QcError::EmptyData(format!(
                "Abundance table {} has no taxon columns",
                path.display()
            )));
        }

        let mut sample_ids: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let sample_id = record
                .get(0)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            if sample_id.is_empty() {
                continue;
            }
            if sample_ids.contains(&sample_id) {
                return Err(QcError::SampleMismatch(format!(
                    "Duplicate sample ID '{}' in {}",
                    sample_id,
                    path.display()
                )));
            }
            sample_ids.push(sample_id);
            rows.push(
                record
                    .iter()
                    .skip(1)
                    .map(|s| s.trim().to_string())
                    .collect(),
            );
        }
        if sample_ids.is_empty() {
            return Err(QcError::EmptyData(format!(
                "No samples in {}",
                path.display()
            )));
        }

        // Classify each column: numeric iff all non-empty cells parse finite.
        let n_cols = headers.len() - 1;
        let mut numeric_cols: Vec<usize> = Vec::new();
        for col in 0..n_cols {
            let mut any_value = false;
            let mut all_numeric = true;
            for row in &rows {
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                if cell.is_empty() {
                    continue;
                }
                any_value = true;
                if !cell.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
                    all_numeric = false;
                    break;
                }
            }
            if any_value && all_numeric {
                numeric_cols.push(col);
            }
        }
        if numeric_cols.is_empty() {
            return Err(QcError::EmptyData(format!(
                "No taxon columns in {}",
                path.display()
            )));
        }

        let taxon_ids: Vec<String> = numeric_cols
            .iter()
            .map(|&col| headers[col + 1].clone())
            .collect();

        let mut tri_mat = TriMat::new((sample_ids.len(), numeric_cols.len()));
        for (row_idx, row) in rows.iter().enumerate() {
            for (new_col, &col) in numeric_cols.iter().enumerate() {
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                if cell.is_empty() {
                    continue;
                }
                let value: f64 = cell.parse().map_err(|_| QcError::InvalidValue {
                    value: cell.to_string(),
                    row: row_idx,
                    column: headers[col + 1].clone(),
                    path: path.to_path_buf(),
                })?;
                if value < 0.0 {
                    return Err(QcError::InvalidValue {
                        value: cell.to_string(),
                        row: row_idx,
                        column: headers[col + 1].clone(),
                        path: path.to_path_buf(),
                    });
                }
                if value > 0.0 {
                    tri_mat.add_triplet(row_idx, new_col, value);
                }
            }
        }

        Self::new(level, tri_mat.to_csr(), sample_ids, taxon_ids)
    }

    /// Convert to row-percentage relative abundances.
    ///
    /// Each row with a positive total is rescaled to sum to 100; rows with a
    /// zero total stay all-zero.
    pub fn relative(&self) -> RelativeAbundanceTable {
        let mut tri_mat = TriMat::new(self.data.shape());
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            let total: f64 = row_vec.iter().map(|(_, &val)| val).sum();
            if total > 0.0 {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(row, col, val / total * PERCENT_SCALE);
                }
            }
        }
        RelativeAbundanceTable {
            level: self.level,
            data: tri_mat.to_csr(),
            sample_ids: self.sample_ids.clone(),
            taxon_ids: self.taxon_ids.clone(),
        }
    }

    /// Subset to the given samples, in the given order.
    pub fn subset_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let index: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(idx, sid)| (sid.as_str(), idx))
            .collect();

        let mut tri_mat = TriMat::new((sample_ids.len(), self.n_taxa()));
        let mut new_sample_ids = Vec::with_capacity(sample_ids.len());
        for (new_row, sid) in sample_ids.iter().enumerate() {
            let &old_row = index.get(sid.as_str()).ok_or_else(|| {
                QcError::SampleMismatch(format!(
                    "Sample '{}' not found in level {} table",
                    sid, self.level
                ))
            })?;
            new_sample_ids.push(sid.clone());
            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        Self::new(
            self.level,
            tri_mat.to_csr(),
            new_sample_ids,
            self.taxon_ids.clone(),
        )
    }

    /// Drop taxa with zero abundance in every sample.
    pub fn drop_absent_taxa(&self) -> Self {
        let mut present = vec![false; self.n_taxa()];
        for (&val, (_, col)) in self.data.iter() {
            if val > 0.0 {
                present[col] = true;
            }
        }
        let kept: Vec<usize> = (0..self.n_taxa()).filter(|&col| present[col]).collect();
        let col_map: HashMap<usize, usize> = kept
            .iter()
            .enumerate()
            .map(|(new_col, &old_col)| (old_col, new_col))
            .collect();

        let mut tri_mat = TriMat::new((self.n_samples(), kept.len()));
        for (&val, (row, old_col)) in self.data.iter() {
            if let Some(&new_col) = col_map.get(&old_col) {
                if val > 0.0 {
                    tri_mat.add_triplet(row, new_col, val);
                }
            }
        }

        Self {
            level: self.level,
            data: tri_mat.to_csr(),
            sample_ids: self.sample_ids.clone(),
            taxon_ids: kept.iter().map(|&col| self.taxon_ids[col].clone()).collect(),
        }
    }

    /// Write the table to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_matrix_tsv(
            path,
            &self.sample_ids,
            &self.taxon_ids,
            |row| self.row_dense(row),
        )
    }

    /// Taxonomic level.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data.get(row, col).copied().unwrap_or(0.0)
    }

    /// Number of samples (rows).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.rows()
    }

    /// Number of taxa (columns).
    #[inline]
    pub fn n_taxa(&self) -> usize {
        self.data.cols()
    }

    /// Total number of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.nnz()
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Taxon identifiers.
    #[inline]
    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    /// Row index of a sample ID.
    pub fn row_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|sid| sid == sample_id)
    }

    /// Dense count vector for one sample.
    pub fn row_dense(&self, row: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_taxa()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Total count for one sample.
    pub fn row_total(&self, row: usize) -> f64 {
        self.data
            .outer_view(row)
            .map(|v| v.iter().map(|(_, &val)| val).sum())
            .unwrap_or(0.0)
    }
}

/// Row-percentage relative abundances at one taxonomic level.
///
/// Produced by [`AbundanceTable::relative`]. Every row whose source counts
/// had a positive total sums to 100; zero rows stay zero.
#[derive(Debug, Clone)]
pub struct RelativeAbundanceTable {
    level: u32,
    data: CsMat<f64>,
    sample_ids: Vec<String>,
    taxon_ids: Vec<String>,
}

impl RelativeAbundanceTable {
    /// Taxonomic level.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data.get(row, col).copied().unwrap_or(0.0)
    }

    /// Number of samples (rows).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.rows()
    }

    /// Number of taxa (columns).
    #[inline]
    pub fn n_taxa(&self) -> usize {
        self.data.cols()
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Taxon identifiers.
    #[inline]
    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    /// Dense percentage vector for one sample.
    pub fn row_dense(&self, row: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_taxa()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Dense percentage vector for one taxon across all samples.
    pub fn col_dense(&self, col: usize) -> Vec<f64> {
        (0..self.n_samples()).map(|row| self.get(row, col)).collect()
    }

    /// Write the table to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_matrix_tsv(
            path,
            &self.sample_ids,
            &self.taxon_ids,
            |row| self.row_dense(row),
        )
    }
}

fn write_matrix_tsv<P, F>(
    path: P,
    sample_ids: &[String],
    taxon_ids: &[String],
    row_dense: F,
) -> Result<()>
where
    P: AsRef<Path>,
    F: Fn(usize) -> Vec<f64>,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write!(writer, "sample_id")?;
    for taxon in taxon_ids {
        write!(writer, "\t{}", taxon)?;
    }
    writeln!(writer)?;

    for (row, sid) in sample_ids.iter().enumerate() {
        write!(writer, "{}", sid)?;
        for value in row_dense(row) {
            write!(writer, "\t{}", value)?;
        }
        writeln!(writer)?;
    }

    Ok(())
}
