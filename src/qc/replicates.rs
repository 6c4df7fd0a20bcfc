//! Biological replicate concordance via cosine similarity of raw counts.

use crate::data::{AbundanceTable, SampleManifest, EXTERNAL_ID};
use crate::error::{QcError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Two samples sharing an external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatePair {
    pub external_id: String,
    pub sample_a: String,
    pub sample_b: String,
}

/// Cosine similarity of one replicate pair at one taxonomic level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateSimilarity {
    pub pair: ReplicatePair,
    pub level: u32,
    /// NaN when either member's count vector is all-zero.
    pub similarity: f64,
}

/// Per-pair, per-level similarities for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateReport {
    pub similarities: Vec<ReplicateSimilarity>,
}

impl ReplicateReport {
    /// Similarities below the given threshold, NaN values included.
    ///
    /// A NaN similarity means a pair member had no counts at that level,
    /// which is itself a reproducibility concern.
    pub fn below_threshold(&self, threshold: f64) -> Vec<&ReplicateSimilarity> {
        self.similarities
            .iter()
            .filter(|s| s.similarity.is_nan() || s.similarity < threshold)
            .collect()
    }

    /// Write the similarity table as TSV.
    pub fn to_tsv<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);

        writeln!(writer, "external_id\tsample_a\tsample_b\tlevel\tsimilarity")?;
        for s in &self.similarities {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{:.6}",
                s.pair.external_id, s.pair.sample_a, s.pair.sample_b, s.level, s.similarity
            )?;
        }
        Ok(())
    }
}

/// Pair up replicate samples by external identifier.
///
/// Blank samples are excluded first. Identifiers with a single member are
/// ignored; identifiers with more than two members form every unordered pair,
/// so triplicate samples are compared three ways rather than dropping one
/// member. Pairs are ordered by external id, then by the sorted member ids.
pub fn pair_replicates(
    manifest: &SampleManifest,
    blank_patterns: &[String],
) -> Result<Vec<ReplicatePair>> {
    let external_ids = manifest.column(EXTERNAL_ID)?;
    let blanks: std::collections::HashSet<String> =
        manifest.blank_samples(blank_patterns).into_iter().collect();

    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (sid, ext) in manifest.sample_ids().iter().zip(external_ids) {
        if blanks.contains(sid) {
            continue;
        }
        if let Some(ext) = ext {
            groups.entry(ext).or_default().push(sid);
        }
    }

    let mut pairs = Vec::new();
    for (ext, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort();
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                pairs.push(ReplicatePair {
                    external_id: ext.to_string(),
                    sample_a: members[i].to_string(),
                    sample_b: members[j].to_string(),
                });
            }
        }
    }
    Ok(pairs)
}

/// Cosine similarity of two raw count vectors.
///
/// Identical non-zero vectors short-circuit to exactly 1.0; any all-zero
/// vector yields NaN; everything else is clamped to [-1, 1] to absorb
/// floating rounding.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let norm_a: f64 = a.iter().map(|x| x * x).sum();
    let norm_b: f64 = b.iter().map(|x| x * x).sum();
    if norm_a == 0.0 || norm_b == 0.0 {
        return f64::NAN;
    }
    if a == b {
        return 1.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Score every replicate pair at every given level.
///
/// Counts are the raw (not relative) vectors. A level missing from `tables`
/// is a caller error surfaced as `InvalidParameter`; missing artifact files
/// are reported earlier by the loader. Pairs absent from a level's table are
/// fatal, since a requested comparison cannot be silently skipped.
pub fn replicate_similarities(
    pairs: &[ReplicatePair],
    tables: &BTreeMap<u32, AbundanceTable>,
    levels: &[u32],
) -> Result<ReplicateReport> {
    for level in levels {
        if !tables.contains_key(level) {
            return Err(QcError::InvalidParameter(format!(
                "No abundance table loaded for level {}",
                level
            )));
        }
    }

    let similarities: Result<Vec<Vec<ReplicateSimilarity>>> = levels
        .par_iter()
        .map(|&level| {
            let table = &tables[&level];
            pairs
                .iter()
                .map(|pair| {
                    let row_a = table.row_index(&pair.sample_a).ok_or_else(|| {
                        QcError::SampleMismatch(format!(
                            "Replicate sample '{}' not in level {} table",
                            pair.sample_a, level
                        ))
                    })?;
                    let row_b = table.row_index(&pair.sample_b).ok_or_else(|| {
                        QcError::SampleMismatch(format!(
                            "Replicate sample '{}' not in level {} table",
                            pair.sample_b, level
                        ))
                    })?;
                    let similarity =
                        cosine_similarity(&table.row_dense(row_a), &table.row_dense(row_b));
                    Ok(ReplicateSimilarity {
                        pair: pair.clone(),
                        level,
                        similarity,
                    })
                })
                .collect()
        })
        .collect();

    Ok(ReplicateReport {
        similarities: similarities?.into_iter().flatten().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sprs::TriMat;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_manifest(rows: &[(&str, &str)]) -> SampleManifest {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "#SampleID\tExternalID").unwrap();
        for (sid, ext) in rows {
            writeln!(file, "{}\t{}", sid, ext).unwrap();
        }
        file.flush().unwrap();
        SampleManifest::from_tsv(file.path()).unwrap()
    }

    fn patterns() -> Vec<String> {
        vec!["water".to_string(), "ntc".to_string()]
    }

    #[test]
    fn test_single_pair_per_duplicated_external_id() {
        let manifest = create_test_manifest(&[
            ("S1", "EXT1"),
            ("S2", "EXT1"),
            ("S3", "EXT2"),
            ("S4", "EXT3"),
            ("S5", "EXT4"),
            ("S6", "EXT5"),
        ]);

        let pairs = pair_replicates(&manifest, &patterns()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].external_id, "EXT1");
        assert_eq!(pairs[0].sample_a, "S1");
        assert_eq!(pairs[0].sample_b, "S2");
    }

    #[test]
    fn test_triplicate_forms_all_pairs() {
        let manifest = create_test_manifest(&[
            ("S1", "EXT1"),
            ("S2", "EXT1"),
            ("S3", "EXT1"),
        ]);

        let pairs = pair_replicates(&manifest, &patterns()).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(
            pairs,
            vec![
                ReplicatePair {
                    external_id: "EXT1".to_string(),
                    sample_a: "S1".to_string(),
                    sample_b: "S2".to_string(),
                },
                ReplicatePair {
                    external_id: "EXT1".to_string(),
                    sample_a: "S1".to_string(),
                    sample_b: "S3".to_string(),
                },
                ReplicatePair {
                    external_id: "EXT1".to_string(),
                    sample_a: "S2".to_string(),
                    sample_b: "S3".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_blanks_excluded_from_pairing() {
        let manifest = create_test_manifest(&[
            ("S1", "EXT1"),
            ("Water-01", "EXT1"),
            ("NTC-02", "EXT2"),
            ("S2", "EXT2"),
        ]);

        let pairs = pair_replicates(&manifest, &patterns()).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_missing_external_id_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "#SampleID\tSample Type").unwrap();
        writeln!(file, "S1\tstool").unwrap();
        file.flush().unwrap();
        let manifest = SampleManifest::from_tsv(file.path()).unwrap();

        let err = pair_replicates(&manifest, &patterns()).unwrap_err();
        assert!(matches!(err, QcError::MissingColumn(_)));
    }

    #[test]
    fn test_cosine_identical_is_exactly_one() {
        let sim = cosine_similarity(&[10.0, 0.0, 5.0], &[10.0, 0.0, 5.0]);
        assert_eq!(sim, 1.0);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert_relative_eq!(sim, 0.0);
    }

    #[test]
    fn test_cosine_zero_vector_is_nan() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).is_nan());
        assert!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]).is_nan());
    }

    #[test]
    fn test_cosine_in_bounds() {
        let sim = cosine_similarity(&[3.0, 4.0], &[4.0, 3.0]);
        assert!(sim > 0.0 && sim <= 1.0);
        assert_relative_eq!(sim, 24.0 / 25.0);
    }

    fn table_for(level: u32, rows: &[(&str, [f64; 3])]) -> AbundanceTable {
        let mut tri_mat = TriMat::new((rows.len(), 3));
        for (row, (_, values)) in rows.iter().enumerate() {
            for (col, &v) in values.iter().enumerate() {
                if v != 0.0 {
                    tri_mat.add_triplet(row, col, v);
                }
            }
        }
        AbundanceTable::new(
            level,
            tri_mat.to_csr(),
            rows.iter().map(|(sid, _)| sid.to_string()).collect(),
            vec!["ta".to_string(), "tb".to_string(), "tc".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_replicate_similarities() {
        let pairs = vec![ReplicatePair {
            external_id: "EXT1".to_string(),
            sample_a: "S1".to_string(),
            sample_b: "S2".to_string(),
        }];
        let mut tables = BTreeMap::new();
        tables.insert(2, table_for(2, &[("S1", [10.0, 0.0, 5.0]), ("S2", [10.0, 0.0, 5.0])]));
        tables.insert(3, table_for(3, &[("S1", [1.0, 0.0, 0.0]), ("S2", [0.0, 1.0, 0.0])]));

        let report = replicate_similarities(&pairs, &tables, &[2, 3]).unwrap();
        assert_eq!(report.similarities.len(), 2);

        let at = |level: u32| {
            report
                .similarities
                .iter()
                .find(|s| s.level == level)
                .unwrap()
                .similarity
        };
        assert_eq!(at(2), 1.0);
        assert_relative_eq!(at(3), 0.0);

        let flags = report.below_threshold(0.99);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].level, 3);
    }

    #[test]
    fn test_zero_vector_pair_flagged_not_fatal() {
        let pairs = vec![ReplicatePair {
            external_id: "EXT1".to_string(),
            sample_a: "S1".to_string(),
            sample_b: "S2".to_string(),
        }];
        let mut tables = BTreeMap::new();
        tables.insert(2, table_for(2, &[("S1", [0.0, 0.0, 0.0]), ("S2", [1.0, 2.0, 3.0])]));

        let report = replicate_similarities(&pairs, &tables, &[2]).unwrap();
        assert!(report.similarities[0].similarity.is_nan());
        assert_eq!(report.below_threshold(0.99).len(), 1);
    }

    #[test]
    fn test_missing_level_table() {
        let pairs = Vec::new();
        let tables = BTreeMap::new();
        let err = replicate_similarities(&pairs, &tables, &[2]).unwrap_err();
        assert!(matches!(err, QcError::InvalidParameter(_)));
    }

    #[test]
    fn test_pair_member_missing_from_table() {
        let pairs = vec![ReplicatePair {
            external_id: "EXT1".to_string(),
            sample_a: "S1".to_string(),
            sample_b: "S9".to_string(),
        }];
        let mut tables = BTreeMap::new();
        tables.insert(2, table_for(2, &[("S1", [1.0, 0.0, 0.0])]));

        let err = replicate_similarities(&pairs, &tables, &[2]).unwrap_err();
        assert!(matches!(err, QcError::SampleMismatch(_)));
    }
}
