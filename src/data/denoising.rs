//! Per-sample denoising stage counts.

use crate::error::{QcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// The five read-count stages of the denoising pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Input,
    Filtered,
    Denoised,
    Merged,
    NonChimeric,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Input,
        Stage::Filtered,
        Stage::Denoised,
        Stage::Merged,
        Stage::NonChimeric,
    ];

    /// Column name used in the stats file.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Filtered => "filtered",
            Stage::Denoised => "denoised",
            Stage::Merged => "merged",
            Stage::NonChimeric => "non-chimeric",
        }
    }
}

/// Read counts for one sample at each denoising stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleReadCounts {
    #[serde(rename = "sample-id")]
    pub sample_id: String,
    pub input: u64,
    pub filtered: u64,
    pub denoised: u64,
    pub merged: u64,
    #[serde(rename = "non-chimeric")]
    pub non_chimeric: u64,
    pub flow_cell: String,
}

impl SampleReadCounts {
    /// Count at a given stage.
    pub fn stage(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Input => self.input,
            Stage::Filtered => self.filtered,
            Stage::Denoised => self.denoised,
            Stage::Merged => self.merged,
            Stage::NonChimeric => self.non_chimeric,
        }
    }
}

/// Denoising stage counts for a set of samples.
#[derive(Debug, Clone)]
pub struct DenoisingStats {
    records: Vec<SampleReadCounts>,
    index: HashMap<String, usize>,
}

impl DenoisingStats {
    /// Build from records, rejecting duplicate sample IDs.
    pub fn new(records: Vec<SampleReadCounts>) -> Result<Self> {
        if records.is_empty() {
            return Err(QcError::EmptyData(
                "No samples in denoising stats".to_string(),
            ));
        }
        let mut index = HashMap::with_capacity(records.len());
        for (idx, rec) in records.iter().enumerate() {
            if index.insert(rec.sample_id.clone(), idx).is_some() {
                return Err(QcError::SampleMismatch(format!(
                    "Duplicate sample ID '{}' in denoising stats",
                    rec.sample_id
                )));
            }
        }
        Ok(Self { records, index })
    }

    /// Load stage counts from a TSV file.
    ///
    /// Expected header: `sample-id`, `input`, `filtered`, `denoised`,
    /// `merged`, `non-chimeric`, `flow_cell`. Counts that fail to parse as
    /// unsigned integers are fatal.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path.as_ref())?;

        let mut records = Vec::new();
        for result in reader.deserialize() {
            let record: SampleReadCounts = result?;
            records.push(record);
        }
        Self::new(records)
    }

    /// All records in file order.
    pub fn records(&self) -> &[SampleReadCounts] {
        &self.records
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.records.len()
    }

    /// Look up a sample by ID.
    pub fn get(&self, sample_id: &str) -> Option<&SampleReadCounts> {
        self.index.get(sample_id).map(|&idx| &self.records[idx])
    }

    /// Distinct flow cells, sorted.
    pub fn flow_cells(&self) -> Vec<String> {
        let mut cells: Vec<String> = self
            .records
            .iter()
            .map(|r| r.flow_cell.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        cells.sort();
        cells
    }
}
