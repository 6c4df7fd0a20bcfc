//! Report configuration for serialization.

use crate::error::{QcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Tunable parameters for a QC run.
///
/// Every field has a default so a config may list only artifact paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportParams {
    /// Candidate sampling depths for the rarefaction sweep, strictly
    /// increasing.
    pub sampling_depths: Vec<u64>,
    /// Case-insensitive substrings marking blank samples.
    pub blank_patterns: Vec<String>,
    /// Taxonomic levels compared for replicate concordance.
    pub replicate_levels: Vec<u32>,
    /// Replicate similarities below this value are flagged.
    pub similarity_threshold: f64,
    /// Manifest column partitioning the read-depth summaries.
    pub group_column: String,
    /// `sampletype` values naming QC populations for the abundance-spread
    /// section.
    pub qc_populations: Vec<String>,
    /// Taxonomic levels summarized for each QC population.
    pub qc_spread_levels: Vec<u32>,
    /// Axes retained by the ordination (minimum 3).
    pub pcoa_axes: usize,
    /// Rows in the lowest-read-depth table.
    pub lowest_depth_n: usize,
}

impl Default for ReportParams {
    fn default() -> Self {
        Self {
            sampling_depths: (1..=8).map(|i| i * 5000).collect(),
            blank_patterns: vec!["water".to_string(), "ntc".to_string()],
            replicate_levels: (2..=7).collect(),
            similarity_threshold: 0.99,
            group_column: "sampletype".to_string(),
            qc_populations: vec!["robogut".to_string(), "artificialcolony".to_string()],
            qc_spread_levels: (2..=6).collect(),
            pcoa_axes: 3,
            lowest_depth_n: 30,
        }
    }
}

/// One run's artifact paths and parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Name of the run, used in the report summary.
    pub name: String,
    /// Tab-delimited sample manifest.
    pub manifest: PathBuf,
    /// Tab-delimited denoising stage counts.
    pub denoising_stats: PathBuf,
    /// Headerless comma-delimited per-sample feature totals.
    pub feature_totals: PathBuf,
    /// Comma-delimited abundance table per taxonomic level.
    pub abundance_levels: BTreeMap<u32, PathBuf>,
    /// Comma-delimited wide alpha-diversity table per metric.
    pub alpha_metrics: BTreeMap<String, PathBuf>,
    /// Tab-delimited distance matrix per beta-diversity metric.
    pub distance_metrics: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub params: ReportParams,
}

impl ReportConfig {
    /// Load a config from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&text).map_err(QcError::from)
    }

    /// Serialize to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(QcError::from)
    }

    /// A starter config with every section wired to conventional paths.
    pub fn example() -> Self {
        Self {
            name: "example-run".to_string(),
            manifest: PathBuf::from("manifest.txt"),
            denoising_stats: PathBuf::from("rpt_denoising_stats.tsv"),
            feature_totals: PathBuf::from("sample-frequency-detail.csv"),
            abundance_levels: (1..=7)
                .map(|level| (level, PathBuf::from(format!("taxa_level_{}.csv", level))))
                .collect(),
            alpha_metrics: [("shannon", "alpha_shannon.csv"), ("observed", "alpha_observed.csv")]
                .iter()
                .map(|&(m, p)| (m.to_string(), PathBuf::from(p)))
                .collect(),
            distance_metrics: [
                ("bray_curtis", "bray_curtis_distance_matrix.tsv"),
                ("jaccard", "jaccard_distance_matrix.tsv"),
                ("weighted_unifrac", "weighted_unifrac_distance_matrix.tsv"),
                ("unweighted_unifrac", "unweighted_unifrac_distance_matrix.tsv"),
            ]
            .iter()
            .map(|&(m, p)| (m.to_string(), PathBuf::from(p)))
            .collect(),
            params: ReportParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_yaml_round_trip() {
        let config = ReportConfig::example();
        let yaml = config.to_yaml().unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();

        let parsed = ReportConfig::from_yaml(file.path()).unwrap();
        assert_eq!(parsed.name, "example-run");
        assert_eq!(parsed.abundance_levels.len(), 7);
        assert_eq!(parsed.distance_metrics.len(), 4);
        assert_eq!(parsed.params.sampling_depths, config.params.sampling_depths);
    }

    #[test]
    fn test_params_default_when_omitted() {
        let yaml = "\
name: minimal
manifest: manifest.txt
denoising_stats: stats.tsv
feature_totals: totals.csv
abundance_levels:
  2: taxa_level_2.csv
alpha_metrics: {}
distance_metrics: {}
";
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = ReportConfig::from_yaml(file.path()).unwrap();
        assert_eq!(config.params.blank_patterns, vec!["water", "ntc"]);
        assert_eq!(config.params.replicate_levels, vec![2, 3, 4, 5, 6, 7]);
        assert_eq!(config.params.similarity_threshold, 0.99);
        assert_eq!(config.params.pcoa_axes, 3);
    }

    #[test]
    fn test_partial_params_override() {
        let yaml = "\
name: partial
manifest: manifest.txt
denoising_stats: stats.tsv
feature_totals: totals.csv
abundance_levels: {}
alpha_metrics: {}
distance_metrics: {}
params:
  sampling_depths: [1000, 2000]
";
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = ReportConfig::from_yaml(file.path()).unwrap();
        assert_eq!(config.params.sampling_depths, vec![1000, 2000]);
        // Untouched fields keep their defaults
        assert_eq!(config.params.group_column, "sampletype");
    }
}
