//! Sample manifest handling for amplicon QC reports.

use crate::error::{QcError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Source column for the derived `sequencer` field.
pub const RUN_ID: &str = "run-id";
/// Source column for the derived `pcr_plate` field.
pub const SOURCE_PCR_PLATE: &str = "sourcepcrplate";
/// Grouping column used by the read-depth and taxon-spread sections.
pub const SAMPLE_TYPE: &str = "sampletype";
/// Column linking biological replicates.
pub const EXTERNAL_ID: &str = "externalid";
/// Derived column: second `_`-separated token of `run-id`.
pub const SEQUENCER: &str = "sequencer";
/// Derived column: first `_`-separated token of `sourcepcrplate`.
pub const PCR_PLATE: &str = "pcr_plate";

/// Normalize a manifest header: lowercase, embedded spaces removed.
fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "")
}

/// Per-sample metadata keyed by sample ID.
///
/// Headers are normalized at load time (lowercased, spaces removed) so that
/// variants such as "Sample Type" and "sampletype" refer to the same column.
/// Columns with no values at all are dropped. When their source columns are
/// present, two derived columns are appended: [`SEQUENCER`] and [`PCR_PLATE`].
#[derive(Debug, Clone)]
pub struct SampleManifest {
    /// Sample IDs in file order.
    sample_ids: Vec<String>,
    /// Normalized column names in file order, derived columns last.
    column_names: Vec<String>,
    /// Data stored as sample_id -> column_name -> value.
    data: HashMap<String, HashMap<String, String>>,
}

impl SampleManifest {
    /// Load a manifest from a TSV file.
    ///
    /// Expected format:
    /// - First row: header (first column is the sample ID column)
    /// - Subsequent rows: sample ID followed by metadata values
    ///
    /// Rows shorter than the header are padded with empty values. Duplicate
    /// sample IDs and duplicate normalized headers are rejected.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| QcError::EmptyData("Empty manifest file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(QcError::EmptyData(
                "Manifest must have at least one metadata column".to_string(),
            ));
        }

        let mut column_names: Vec<String> = Vec::with_capacity(header.len() - 1);
        let mut seen = HashSet::new();
        for raw in &header[1..] {
            let name = normalize_header(raw);
            if !seen.insert(name.clone()) {
                return Err(QcError::InvalidParameter(format!(
                    "Duplicate manifest column '{}' after header normalization",
                    name
                )));
            }
            column_names.push(name);
        }

        let mut sample_ids = Vec::new();
        let mut data: HashMap<String, HashMap<String, String>> = HashMap::new();

        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let sample_id = fields[0].trim().to_string();
            if sample_id.is_empty() {
                continue;
            }
            if data.contains_key(&sample_id) {
                return Err(QcError::SampleMismatch(format!(
                    "Duplicate sample ID '{}' in manifest",
                    sample_id
                )));
            }

            let mut sample_data = HashMap::new();
            for (col_idx, col_name) in column_names.iter().enumerate() {
                let value = fields
                    .get(col_idx + 1)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                sample_data.insert(col_name.clone(), value);
            }
            sample_ids.push(sample_id.clone());
            data.insert(sample_id, sample_data);
        }

        if sample_ids.is_empty() {
            return Err(QcError::EmptyData("No samples in manifest".to_string()));
        }

        let mut manifest = Self {
            sample_ids,
            column_names,
            data,
        };
        manifest.drop_empty_columns();
        manifest.derive_columns(path)?;
        Ok(manifest)
    }

    /// Remove columns whose values are empty for every sample.
    fn drop_empty_columns(&mut self) {
        let kept: Vec<String> = self
            .column_names
            .iter()
            .filter(|col| {
                self.sample_ids.iter().any(|sid| {
                    self.data
                        .get(sid)
                        .and_then(|m| m.get(*col))
                        .is_some_and(|v| !v.is_empty())
                })
            })
            .cloned()
            .collect();

        for sample_data in self.data.values_mut() {
            sample_data.retain(|col, _| kept.contains(col));
        }
        self.column_names = kept;
    }

    /// Append the derived `sequencer` and `pcr_plate` columns.
    ///
    /// `sequencer` requires a second `_`-separated token in every non-empty
    /// `run-id` value; a value without one is malformed. `pcr_plate` takes the
    /// first token of `sourcepcrplate`, which always exists.
    fn derive_columns(&mut self, path: &Path) -> Result<()> {
        if self.has_column(RUN_ID) {
            let mut sequencers = Vec::with_capacity(self.n_samples());
            for (row, sid) in self.sample_ids.iter().enumerate() {
                let run_id = self.get(sid, RUN_ID).unwrap_or("");
                let sequencer = if run_id.is_empty() {
                    String::new()
                } else {
                    run_id
                        .split('_')
                        .nth(1)
                        .ok_or_else(|| QcError::InvalidValue {
                            value: run_id.to_string(),
                            row,
                            column: RUN_ID.to_string(),
                            path: path.to_path_buf(),
                        })?
                        .to_string()
                };
                sequencers.push(sequencer);
            }
            for (sid, sequencer) in self.sample_ids.clone().into_iter().zip(sequencers) {
                if let Some(sample_data) = self.data.get_mut(&sid) {
                    sample_data.insert(SEQUENCER.to_string(), sequencer);
                }
            }
            self.column_names.push(SEQUENCER.to_string());
        }

        if self.has_column(SOURCE_PCR_PLATE) {
            let plates: Vec<String> = self
                .sample_ids
                .iter()
                .map(|sid| {
                    self.get(sid, SOURCE_PCR_PLATE)
                        .and_then(|v| v.split('_').next())
                        .unwrap_or_default()
                        .to_string()
                })
                .collect();
            for (sid, plate) in self.sample_ids.clone().into_iter().zip(plates) {
                if let Some(sample_data) = self.data.get_mut(&sid) {
                    sample_data.insert(PCR_PLATE.to_string(), plate);
                }
            }
            self.column_names.push(PCR_PLATE.to_string());
        }

        Ok(())
    }

    /// Sample IDs in manifest order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Normalized column names, derived columns last.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Get a value for a sample and column. Empty cells return `None`.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&str> {
        self.data
            .get(sample_id)
            .and_then(|m| m.get(column))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// All values for a column in sample order. Empty cells are `None`.
    pub fn column(&self, column: &str) -> Result<Vec<Option<&str>>> {
        if !self.has_column(column) {
            return Err(QcError::MissingColumn(column.to_string()));
        }
        Ok(self
            .sample_ids
            .iter()
            .map(|sid| self.get(sid, column))
            .collect())
    }

    /// Distinct non-empty values of a column, sorted.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        let values = self.column(column)?;
        let mut levels: Vec<String> = values
            .into_iter()
            .flatten()
            .map(String::from)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        levels.sort();
        Ok(levels)
    }

    /// Number of samples per distinct value of a column.
    ///
    /// Empty cells are not counted. This backs the "samples included"
    /// section of the report.
    pub fn group_counts(&self, column: &str) -> Result<BTreeMap<String, usize>> {
        let values = self.column(column)?;
        let mut counts = BTreeMap::new();
        for value in values.into_iter().flatten() {
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Sample IDs whose identifier contains any of the given patterns,
    /// case-insensitively. Used to detect water and NTC blanks.
    pub fn blank_samples(&self, patterns: &[String]) -> Vec<String> {
        self.sample_ids
            .iter()
            .filter(|sid| is_blank_id(sid, patterns))
            .cloned()
            .collect()
    }

    /// Subset the manifest to the given samples, in the given order.
    pub fn subset_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let mut new_data = HashMap::new();
        let mut new_sample_ids = Vec::new();

        for sid in sample_ids {
            if let Some(sample_data) = self.data.get(sid) {
                new_data.insert(sid.clone(), sample_data.clone());
                new_sample_ids.push(sid.clone());
            } else {
                return Err(QcError::SampleMismatch(format!(
                    "Sample '{}' not found in manifest",
                    sid
                )));
            }
        }

        Ok(Self {
            sample_ids: new_sample_ids,
            column_names: self.column_names.clone(),
            data: new_data,
        })
    }

    /// Check if a sample exists.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

/// Check whether a sample identifier matches any blank pattern,
/// case-insensitively.
pub fn is_blank_id(sample_id: &str, patterns: &[String]) -> bool {
    let lower = sample_id.to_lowercase();
    patterns.iter().any(|p| lower.contains(&p.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_manifest() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "#SampleID\tRun-Id\tSourcePCRPlate\tSample Type\tExternalID\tNotes"
        )
        .unwrap();
        writeln!(file, "S1\t220101_M01234_0042_A1\tPL01_A01\tstool\tEXT1\t").unwrap();
        writeln!(file, "S2\t220101_M01234_0042_A1\tPL01_A02\tstool\tEXT1\t").unwrap();
        writeln!(file, "S3\t220108_M05678_0043_B1\tPL02_A01\tsaliva\tEXT2\t").unwrap();
        writeln!(file, "Water-01\t220108_M05678_0043_B1\tPL02_H12\tblank\t\t").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_normalizes_headers() {
        let file = create_test_manifest();
        let manifest = SampleManifest::from_tsv(file.path()).unwrap();

        assert_eq!(manifest.n_samples(), 4);
        assert!(manifest.has_column("run-id"));
        assert!(manifest.has_column("sourcepcrplate"));
        assert!(manifest.has_column("sampletype"));
        assert!(manifest.has_column("externalid"));
        // "Notes" has no values and is dropped
        assert!(!manifest.has_column("notes"));
    }

    #[test]
    fn test_derived_columns() {
        let file = create_test_manifest();
        let manifest = SampleManifest::from_tsv(file.path()).unwrap();

        assert_eq!(manifest.get("S1", SEQUENCER), Some("M01234"));
        assert_eq!(manifest.get("S3", SEQUENCER), Some("M05678"));
        assert_eq!(manifest.get("S1", PCR_PLATE), Some("PL01"));
        assert_eq!(manifest.get("Water-01", PCR_PLATE), Some("PL02"));
    }

    #[test]
    fn test_derived_columns_absent_without_sources() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "#SampleID\tSample Type").unwrap();
        writeln!(file, "S1\tstool").unwrap();
        file.flush().unwrap();

        let manifest = SampleManifest::from_tsv(file.path()).unwrap();
        assert!(!manifest.has_column(SEQUENCER));
        assert!(!manifest.has_column(PCR_PLATE));
    }

    #[test]
    fn test_malformed_run_id() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "#SampleID\tRun-Id").unwrap();
        writeln!(file, "S1\tnounderscore").unwrap();
        file.flush().unwrap();

        let err = SampleManifest::from_tsv(file.path()).unwrap_err();
        assert!(matches!(err, QcError::InvalidValue { .. }));
    }

    #[test]
    fn test_blank_detection() {
        let file = create_test_manifest();
        let manifest = SampleManifest::from_tsv(file.path()).unwrap();

        let patterns = vec!["water".to_string(), "ntc".to_string()];
        assert_eq!(manifest.blank_samples(&patterns), vec!["Water-01"]);
        assert!(is_blank_id("NTC-plate3", &patterns));
        assert!(!is_blank_id("S1", &patterns));
    }

    #[test]
    fn test_group_counts() {
        let file = create_test_manifest();
        let manifest = SampleManifest::from_tsv(file.path()).unwrap();

        let counts = manifest.group_counts("sampletype").unwrap();
        assert_eq!(counts.get("stool"), Some(&2));
        assert_eq!(counts.get("saliva"), Some(&1));
        assert_eq!(counts.get("blank"), Some(&1));

        // Water-01 has no externalid, so only two values are counted
        let counts = manifest.group_counts("externalid").unwrap();
        assert_eq!(counts.values().sum::<usize>(), 3);
    }

    #[test]
    fn test_levels_and_missing_column() {
        let file = create_test_manifest();
        let manifest = SampleManifest::from_tsv(file.path()).unwrap();

        let levels = manifest.levels("sampletype").unwrap();
        assert_eq!(levels, vec!["blank", "saliva", "stool"]);

        let err = manifest.levels("nosuchcolumn").unwrap_err();
        assert!(matches!(err, QcError::MissingColumn(_)));
    }

    #[test]
    fn test_subset_samples() {
        let file = create_test_manifest();
        let manifest = SampleManifest::from_tsv(file.path()).unwrap();

        let subset = manifest
            .subset_samples(&["S3".to_string(), "S1".to_string()])
            .unwrap();
        assert_eq!(subset.sample_ids(), &["S3", "S1"]);

        let err = manifest.subset_samples(&["missing".to_string()]).unwrap_err();
        assert!(matches!(err, QcError::SampleMismatch(_)));
    }

    #[test]
    fn test_duplicate_sample_id() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "#SampleID\tSample Type").unwrap();
        writeln!(file, "S1\tstool").unwrap();
        writeln!(file, "S1\tsaliva").unwrap();
        file.flush().unwrap();

        let err = SampleManifest::from_tsv(file.path()).unwrap_err();
        assert!(matches!(err, QcError::SampleMismatch(_)));
    }

    #[test]
    fn test_duplicate_normalized_header() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "#SampleID\tRun-Id\trun-id").unwrap();
        writeln!(file, "S1\t220101_M1_0042\t220101_M1_0042").unwrap();
        file.flush().unwrap();

        let err = SampleManifest::from_tsv(file.path()).unwrap_err();
        assert!(matches!(err, QcError::InvalidParameter(_)));
    }

    #[test]
    fn test_empty_cell_is_none() {
        let file = create_test_manifest();
        let manifest = SampleManifest::from_tsv(file.path()).unwrap();

        assert_eq!(manifest.get("Water-01", "externalid"), None);
        let column = manifest.column("externalid").unwrap();
        assert_eq!(column[3], None);
    }
}
