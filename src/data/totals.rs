//! Per-sample total feature counts.

use crate::error::{QcError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Total feature count per sample, loaded from the headerless two-column
/// frequency export (sample ID, total).
///
/// Totals are written as floats upstream and are truncated to integral
/// counts here.
#[derive(Debug, Clone)]
pub struct FeatureTotals {
    sample_ids: Vec<String>,
    totals: Vec<u64>,
    index: HashMap<String, usize>,
}

impl FeatureTotals {
    /// Build from parallel vectors of IDs and totals.
    pub fn new(sample_ids: Vec<String>, totals: Vec<u64>) -> Result<Self> {
        if sample_ids.len() != totals.len() {
            return Err(QcError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: totals.len(),
            });
        }
        if sample_ids.is_empty() {
            return Err(QcError::EmptyData(
                "No samples in feature totals".to_string(),
            ));
        }
        let mut index = HashMap::with_capacity(sample_ids.len());
        for (idx, sid) in sample_ids.iter().enumerate() {
            if index.insert(sid.clone(), idx).is_some() {
                return Err(QcError::SampleMismatch(format!(
                    "Duplicate sample ID '{}' in feature totals",
                    sid
                )));
            }
        }
        Ok(Self {
            sample_ids,
            totals,
            index,
        })
    }

    /// Load totals from a headerless comma-delimited file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)?;

        let mut sample_ids = Vec::new();
        let mut totals = Vec::new();
        for (row_idx, result) in reader.records().enumerate() {
            let record = result?;
            let sample_id = record
                .get(0)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            if sample_id.is_empty() {
                continue;
            }
            let raw = record.get(1).map(str::trim).unwrap_or("");
            let value: f64 = raw.parse().map_err(|_| QcError::InvalidValue {
                value: raw.to_string(),
                row: row_idx,
                column: "total".to_string(),
                path: path.to_path_buf(),
            })?;
            if !value.is_finite() || value < 0.0 {
                return Err(QcError::InvalidValue {
                    value: raw.to_string(),
                    row: row_idx,
                    column: "total".to_string(),
                    path: path.to_path_buf(),
                });
            }
            sample_ids.push(sample_id);
            totals.push(value.trunc() as u64);
        }

        Self::new(sample_ids, totals)
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Sample IDs in file order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Total for one sample.
    pub fn get(&self, sample_id: &str) -> Option<u64> {
        self.index.get(sample_id).map(|&idx| self.totals[idx])
    }

    /// Iterate over (sample ID, total) pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.sample_ids
            .iter()
            .zip(self.totals.iter())
            .map(|(sid, &total)| (sid.as_str(), total))
    }

    /// Sum of all totals.
    pub fn sum(&self) -> u64 {
        self.totals.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_totals() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "S1,3000.0").unwrap();
        writeln!(file, "S2,8000.0").unwrap();
        writeln!(file, "Water-01,120.0").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_totals() {
        let file = create_test_totals();
        let totals = FeatureTotals::from_csv(file.path()).unwrap();

        assert_eq!(totals.n_samples(), 3);
        assert_eq!(totals.get("S1"), Some(3000));
        assert_eq!(totals.get("Water-01"), Some(120));
        assert_eq!(totals.get("missing"), None);
        assert_eq!(totals.sum(), 11120);
    }

    #[test]
    fn test_float_totals_truncate() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "S1,3000.7").unwrap();
        file.flush().unwrap();

        let totals = FeatureTotals::from_csv(file.path()).unwrap();
        assert_eq!(totals.get("S1"), Some(3000));
    }

    #[test]
    fn test_unparsable_total_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "S1,lots").unwrap();
        file.flush().unwrap();

        let err = FeatureTotals::from_csv(file.path()).unwrap_err();
        assert!(matches!(err, QcError::InvalidValue { .. }));
    }

    #[test]
    fn test_negative_total_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "S1,-5").unwrap();
        file.flush().unwrap();

        let err = FeatureTotals::from_csv(file.path()).unwrap_err();
        assert!(matches!(err, QcError::InvalidValue { .. }));
    }

    #[test]
    fn test_duplicate_sample_id() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "S1,3000").unwrap();
        writeln!(file, "S1,4000").unwrap();
        file.flush().unwrap();

        let err = FeatureTotals::from_csv(file.path()).unwrap_err();
        assert!(matches!(err, QcError::SampleMismatch(_)));
    }
}
