//! Read-depth summaries across denoising stages.

use crate::data::{is_blank_id, DenoisingStats, SampleManifest, SampleReadCounts, Stage, EXTERNAL_ID};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;

/// Five-number summary of a set of values.
///
/// Quartiles use linear interpolation between order statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiveNumberSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl FiveNumberSummary {
    /// Summarize a non-empty slice of values. Returns `None` for an empty one.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(Self {
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Linear-interpolation quantile of an already sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (h - lo as f64)
}

/// Mean and confidence half-width for one denoising stage within a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub mean: f64,
    /// Half-width of the 95% normal-approximation confidence interval.
    /// Zero for single-sample groups.
    pub ci_half_width: f64,
}

/// Per-stage read-depth summary for one group of samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDepthSummary {
    pub group: String,
    pub n_samples: usize,
    pub stages: Vec<StageSummary>,
}

impl std::fmt::Display for GroupDepthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Read depth for '{}' ({} samples)", self.group, self.n_samples)?;
        for stage in &self.stages {
            writeln!(
                f,
                "  {:13} {:.1} ± {:.1}",
                stage.stage.name(),
                stage.mean,
                stage.ci_half_width
            )?;
        }
        Ok(())
    }
}

/// Summarize read depth per denoising stage for each distinct value of a
/// manifest column.
///
/// Samples present in the manifest but absent from the stats are skipped, as
/// are group values with no remaining samples. The confidence half-width is
/// `z₀.₉₇₅ · s / √n` with the sample standard deviation.
pub fn depth_by_group(
    stats: &DenoisingStats,
    manifest: &SampleManifest,
    group_column: &str,
) -> Result<Vec<GroupDepthSummary>> {
    let levels = manifest.levels(group_column)?;
    let normal = Normal::new(0.0, 1.0).unwrap();
    let z = normal.inverse_cdf(0.975);

    let mut summaries = Vec::new();
    for group in levels {
        let members: Vec<&SampleReadCounts> = manifest
            .sample_ids()
            .iter()
            .filter(|sid| manifest.get(sid, group_column) == Some(group.as_str()))
            .filter_map(|sid| stats.get(sid))
            .collect();
        if members.is_empty() {
            continue;
        }

        let n = members.len();
        let stages = Stage::ALL
            .iter()
            .map(|&stage| {
                let values: Vec<f64> = members.iter().map(|m| m.stage(stage) as f64).collect();
                let mean = values.iter().sum::<f64>() / n as f64;
                let ci_half_width = if n > 1 {
                    let variance = values
                        .iter()
                        .map(|&v| (v - mean) * (v - mean))
                        .sum::<f64>()
                        / (n - 1) as f64;
                    z * variance.sqrt() / (n as f64).sqrt()
                } else {
                    0.0
                };
                StageSummary {
                    stage,
                    mean,
                    ci_half_width,
                }
            })
            .collect();

        summaries.push(GroupDepthSummary {
            group,
            n_samples: n,
            stages,
        });
    }
    Ok(summaries)
}

/// Input-stage depth distribution for one flow cell, blanks excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCellDepth {
    pub flow_cell: String,
    pub n_samples: usize,
    pub summary: FiveNumberSummary,
}

/// Summarize input-stage read depth per flow cell, excluding blank samples.
///
/// Flow cells are returned in sorted order; cells containing only blanks are
/// omitted.
pub fn flow_cell_depth_summary(
    stats: &DenoisingStats,
    blank_patterns: &[String],
) -> Vec<FlowCellDepth> {
    let mut by_cell: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for rec in stats.records() {
        if is_blank_id(&rec.sample_id, blank_patterns) {
            continue;
        }
        by_cell
            .entry(rec.flow_cell.as_str())
            .or_default()
            .push(rec.input as f64);
    }

    by_cell
        .into_iter()
        .filter_map(|(cell, values)| {
            FiveNumberSummary::from_values(&values).map(|summary| FlowCellDepth {
                flow_cell: cell.to_string(),
                n_samples: values.len(),
                summary,
            })
        })
        .collect()
}

/// One row of the lowest-depth sample table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowDepthSample {
    pub sample_id: String,
    pub external_id: Option<String>,
    pub input: u64,
    pub filtered: u64,
    pub denoised: u64,
    pub merged: u64,
    pub non_chimeric: u64,
}

/// The `n` samples with the smallest non-chimeric read counts, ascending.
///
/// External IDs are attached when the manifest carries that column.
pub fn lowest_depth_samples(
    stats: &DenoisingStats,
    manifest: &SampleManifest,
    n: usize,
) -> Vec<LowDepthSample> {
    let mut records: Vec<&SampleReadCounts> = stats.records().iter().collect();
    records.sort_by_key(|r| r.non_chimeric);
    records
        .into_iter()
        .take(n)
        .map(|r| LowDepthSample {
            sample_id: r.sample_id.clone(),
            external_id: manifest
                .get(&r.sample_id, EXTERNAL_ID)
                .map(str::to_string),
            input: r.input,
            filtered: r.filtered,
            denoised: r.denoised,
            merged: r.merged,
            non_chimeric: r.non_chimeric,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QcError;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn counts(sample_id: &str, base: u64, flow_cell: &str) -> SampleReadCounts {
        SampleReadCounts {
            sample_id: sample_id.to_string(),
            input: base,
            filtered: base.saturating_sub(1000),
            denoised: base.saturating_sub(1500),
            merged: base.saturating_sub(2000),
            non_chimeric: base.saturating_sub(2500),
            flow_cell: flow_cell.to_string(),
        }
    }

    fn create_test_stats() -> DenoisingStats {
        DenoisingStats::new(vec![
            counts("S1", 10000, "FC1"),
            counts("S2", 12000, "FC1"),
            counts("S3", 8000, "FC2"),
            counts("Water-01", 300, "FC2"),
        ])
        .unwrap()
    }

    fn create_test_manifest() -> SampleManifest {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "#SampleID\tSample Type\tExternalID").unwrap();
        writeln!(file, "S1\tstool\tEXT1").unwrap();
        writeln!(file, "S2\tstool\tEXT2").unwrap();
        writeln!(file, "S3\tsaliva\tEXT3").unwrap();
        writeln!(file, "Water-01\tblank\t").unwrap();
        file.flush().unwrap();
        SampleManifest::from_tsv(file.path()).unwrap()
    }

    #[test]
    fn test_depth_by_group_mean_and_ci() {
        let stats = create_test_stats();
        let manifest = create_test_manifest();

        let summaries = depth_by_group(&stats, &manifest, "sampletype").unwrap();
        let stool = summaries.iter().find(|s| s.group == "stool").unwrap();
        assert_eq!(stool.n_samples, 2);

        let input = &stool.stages[0];
        assert_eq!(input.stage, Stage::Input);
        assert_relative_eq!(input.mean, 11000.0);
        // s = sqrt(2e6), half-width = 1.95996 * s / sqrt(2)
        assert_relative_eq!(input.ci_half_width, 1959.964, epsilon = 1e-2);
    }

    #[test]
    fn test_single_sample_group_has_zero_ci() {
        let stats = create_test_stats();
        let manifest = create_test_manifest();

        let summaries = depth_by_group(&stats, &manifest, "sampletype").unwrap();
        let saliva = summaries.iter().find(|s| s.group == "saliva").unwrap();
        assert_eq!(saliva.n_samples, 1);
        assert!(saliva.stages.iter().all(|s| s.ci_half_width == 0.0));
        assert_relative_eq!(saliva.stages[4].mean, 5500.0);
    }

    #[test]
    fn test_missing_group_column() {
        let stats = create_test_stats();
        let manifest = create_test_manifest();

        let err = depth_by_group(&stats, &manifest, "nosuchcolumn").unwrap_err();
        assert!(matches!(err, QcError::MissingColumn(_)));
    }

    #[test]
    fn test_flow_cell_summary_excludes_blanks() {
        let stats = create_test_stats();
        let patterns = vec!["water".to_string(), "ntc".to_string()];

        let cells = flow_cell_depth_summary(&stats, &patterns);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].flow_cell, "FC1");
        assert_eq!(cells[0].n_samples, 2);
        assert_relative_eq!(cells[0].summary.median, 11000.0);
        // FC2 keeps only S3 once the water blank is dropped
        assert_eq!(cells[1].n_samples, 1);
        assert_relative_eq!(cells[1].summary.min, 8000.0);
        assert_relative_eq!(cells[1].summary.max, 8000.0);
    }

    #[test]
    fn test_lowest_depth_samples() {
        let stats = create_test_stats();
        let manifest = create_test_manifest();

        let lowest = lowest_depth_samples(&stats, &manifest, 2);
        assert_eq!(lowest.len(), 2);
        assert_eq!(lowest[0].sample_id, "Water-01");
        assert_eq!(lowest[0].external_id, None);
        assert_eq!(lowest[1].sample_id, "S3");
        assert_eq!(lowest[1].external_id.as_deref(), Some("EXT3"));
        assert_eq!(lowest[1].non_chimeric, 5500);
    }

    #[test]
    fn test_lowest_depth_truncates_to_available() {
        let stats = create_test_stats();
        let manifest = create_test_manifest();

        let lowest = lowest_depth_samples(&stats, &manifest, 30);
        assert_eq!(lowest.len(), 4);
    }

    #[test]
    fn test_five_number_interpolation() {
        let summary = FiveNumberSummary::from_values(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_relative_eq!(summary.min, 1.0);
        assert_relative_eq!(summary.q1, 1.75);
        assert_relative_eq!(summary.median, 2.5);
        assert_relative_eq!(summary.q3, 3.25);
        assert_relative_eq!(summary.max, 4.0);

        assert!(FiveNumberSummary::from_values(&[]).is_none());
    }
}
