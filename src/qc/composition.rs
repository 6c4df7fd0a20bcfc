//! Taxonomic composition summaries per classification level.

use super::depth::FiveNumberSummary;
use crate::data::{AbundanceTable, RelativeAbundanceTable};
use crate::error::{QcError, Result};
use serde::{Deserialize, Serialize};

/// Absolute and relative composition for one classification level.
#[derive(Debug, Clone)]
pub struct LevelComposition {
    pub level: u32,
    pub absolute: AbundanceTable,
    pub relative: RelativeAbundanceTable,
}

/// Build the composition summary for one level table.
///
/// The relative table is a pure function of the absolute one; recomputing it
/// from its own output leaves the values unchanged.
pub fn level_composition(table: &AbundanceTable) -> LevelComposition {
    LevelComposition {
        level: table.level(),
        absolute: table.clone(),
        relative: table.relative(),
    }
}

/// Per-taxon spread of relative abundances within a sample population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonSpreadRow {
    pub taxon: String,
    pub summary: FiveNumberSummary,
}

/// Relative-abundance spread across a QC population at one level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonSpread {
    pub level: u32,
    pub n_samples: usize,
    pub rows: Vec<TaxonSpreadRow>,
}

/// Summarize the per-taxon relative-abundance distribution over a population
/// of samples.
///
/// The table is subset to the population, taxa absent from every member are
/// dropped, and the remaining counts are converted to row percentages before
/// summarizing each taxon column.
pub fn taxon_spread(table: &AbundanceTable, sample_ids: &[String]) -> Result<TaxonSpread> {
    if sample_ids.is_empty() {
        return Err(QcError::EmptyData(
            "No samples in QC population".to_string(),
        ));
    }
    let subset = table.subset_samples(sample_ids)?.drop_absent_taxa();
    let relative = subset.relative();

    let rows = relative
        .taxon_ids()
        .iter()
        .enumerate()
        .filter_map(|(col, taxon)| {
            FiveNumberSummary::from_values(&relative.col_dense(col)).map(|summary| {
                TaxonSpreadRow {
                    taxon: taxon.clone(),
                    summary,
                }
            })
        })
        .collect();

    Ok(TaxonSpread {
        level: table.level(),
        n_samples: sample_ids.len(),
        rows,
    })
}
