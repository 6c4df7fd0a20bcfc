//! Loads run artifacts and assembles the report sections.

use crate::data::{
    AbundanceTable, DenoisingStats, DistanceMatrix, FeatureTotals, SampleManifest, EXTERNAL_ID,
    PCR_PLATE, SEQUENCER,
};
use crate::diversity::{pcoa, reshape_alpha, AlphaLong, PcoaResult};
use crate::error::{QcError, Result};
use crate::qc::{
    depth_by_group, flow_cell_depth_summary, level_composition, lowest_depth_samples,
    pair_replicates, rarefaction_sweep, replicate_similarities, taxon_spread,
};
use crate::report::{Notice, QcPopulationSpread, QcReport, ReportConfig};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

/// Error out with the artifact label when a required input file is absent.
fn require_artifact(label: &str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(QcError::missing_artifact(label, path))
    }
}

/// Compute every section of the QC report for one run.
///
/// The manifest loads first; everything else derives from it. Missing files
/// for requested levels and metrics are fatal, while absent optional manifest
/// columns and empty QC populations degrade to a [`Notice`]. Per-level and
/// per-metric work is dispatched in parallel.
pub fn run_report(config: &ReportConfig) -> Result<QcReport> {
    let params = &config.params;
    let mut notices = Vec::new();

    require_artifact("sample manifest", &config.manifest)?;
    let manifest = SampleManifest::from_tsv(&config.manifest)?;
    info!(
        "Loaded manifest: {} samples, {} columns",
        manifest.n_samples(),
        manifest.n_columns()
    );
    let blanks = manifest.blank_samples(&params.blank_patterns);
    debug!("{} blank samples detected", blanks.len());

    // Samples-included section over the grouping columns that exist.
    let mut sample_groups = BTreeMap::new();
    for column in [params.group_column.as_str(), SEQUENCER, PCR_PLATE] {
        if manifest.has_column(column) {
            sample_groups.insert(column.to_string(), manifest.group_counts(column)?);
        } else {
            notices.push(Notice {
                section: "sample_groups".to_string(),
                reason: format!("Manifest column '{}' not detected", column),
            });
        }
    }

    // Read-depth sections.
    require_artifact("denoising stats", &config.denoising_stats)?;
    let stats = DenoisingStats::from_tsv(&config.denoising_stats)?;
    let group_depth = if manifest.has_column(&params.group_column) {
        depth_by_group(&stats, &manifest, &params.group_column)?
    } else {
        notices.push(Notice {
            section: "group_depth".to_string(),
            reason: format!("Manifest column '{}' not detected", params.group_column),
        });
        Vec::new()
    };
    let flow_cells = flow_cell_depth_summary(&stats, &params.blank_patterns);
    let lowest_depth = lowest_depth_samples(&stats, &manifest, params.lowest_depth_n);

    // Rarefaction sweep.
    require_artifact("feature totals", &config.feature_totals)?;
    let totals = FeatureTotals::from_csv(&config.feature_totals)?;
    if blanks.is_empty() {
        notices.push(Notice {
            section: "rarefaction".to_string(),
            reason: "No blank samples; blank-retention column not applicable".to_string(),
        });
    }
    let rarefaction = rarefaction_sweep(&totals, &params.sampling_depths, &blanks)?;

    // Per-level abundance tables, loaded in parallel.
    for (level, path) in &config.abundance_levels {
        require_artifact(&format!("abundance table for level {}", level), path)?;
    }
    let tables: BTreeMap<u32, AbundanceTable> = config
        .abundance_levels
        .par_iter()
        .map(|(&level, path)| {
            let table = AbundanceTable::from_csv(path, level)?;
            for sid in table.sample_ids() {
                if !manifest.has_sample(sid) {
                    return Err(QcError::SampleMismatch(format!(
                        "Sample '{}' in level {} table is not in the manifest",
                        sid, level
                    )));
                }
            }
            Ok((level, table))
        })
        .collect::<Result<_>>()?;
    let compositions = tables
        .par_iter()
        .map(|(_, table)| level_composition(table))
        .collect();

    // Replicate concordance.
    let replicates = if manifest.has_column(EXTERNAL_ID) {
        for level in &params.replicate_levels {
            if !tables.contains_key(level) {
                return Err(QcError::missing_artifact(
                    format!("abundance table for replicate level {}", level),
                    format!("taxa_level_{}.csv", level),
                ));
            }
        }
        let pairs = pair_replicates(&manifest, &params.blank_patterns)?;
        if pairs.is_empty() {
            notices.push(Notice {
                section: "replicates".to_string(),
                reason: "No external identifier is shared by two non-blank samples".to_string(),
            });
            None
        } else {
            let report = replicate_similarities(&pairs, &tables, &params.replicate_levels)?;
            for flag in report.below_threshold(params.similarity_threshold) {
                warn!(
                    "Replicate pair {} ({} vs {}) at level {}: similarity {:.4} below {}",
                    flag.pair.external_id,
                    flag.pair.sample_a,
                    flag.pair.sample_b,
                    flag.level,
                    flag.similarity,
                    params.similarity_threshold
                );
            }
            Some(report)
        }
    } else {
        notices.push(Notice {
            section: "replicates".to_string(),
            reason: format!("Manifest column '{}' not detected", EXTERNAL_ID),
        });
        None
    };

    // QC-population abundance spreads.
    let mut qc_spreads = Vec::new();
    if manifest.has_column(&params.group_column) {
        for population in &params.qc_populations {
            let wanted = population.to_lowercase().replace(' ', "");
            let members: Vec<String> = manifest
                .sample_ids()
                .iter()
                .filter(|sid| {
                    manifest
                        .get(sid, &params.group_column)
                        .is_some_and(|v| v.to_lowercase().replace(' ', "") == wanted)
                })
                .cloned()
                .collect();
            if members.is_empty() {
                notices.push(Notice {
                    section: "qc_spread".to_string(),
                    reason: format!("No '{}' samples were included in this run", population),
                });
                continue;
            }
            for level in &params.qc_spread_levels {
                if !tables.contains_key(level) {
                    return Err(QcError::missing_artifact(
                        format!("abundance table for QC-spread level {}", level),
                        format!("taxa_level_{}.csv", level),
                    ));
                }
            }
            let spreads = params
                .qc_spread_levels
                .par_iter()
                .map(|level| taxon_spread(&tables[level], &members))
                .collect::<Result<Vec<_>>>()?;
            qc_spreads.push(QcPopulationSpread {
                population: population.clone(),
                spreads,
            });
        }
    }

    // Alpha-diversity reshaping, one metric per task.
    for (metric, path) in &config.alpha_metrics {
        require_artifact(&format!("alpha-diversity table '{}'", metric), path)?;
    }
    let alpha: BTreeMap<String, AlphaLong> = config
        .alpha_metrics
        .par_iter()
        .map(|(metric, path)| Ok((metric.clone(), reshape_alpha(path, metric)?)))
        .collect::<Result<_>>()?;

    // Beta-diversity ordinations, one metric per task.
    for (metric, path) in &config.distance_metrics {
        require_artifact(&format!("distance matrix '{}'", metric), path)?;
    }
    let ordinations: BTreeMap<String, PcoaResult> = config
        .distance_metrics
        .par_iter()
        .map(|(metric, path)| {
            let dm = DistanceMatrix::from_tsv(path)?;
            Ok((metric.clone(), pcoa(&dm, params.pcoa_axes)?))
        })
        .collect::<Result<_>>()?;
    for (metric, result) in &ordinations {
        if let Some(diag) = &result.diagnostic {
            warn!("PCoA for '{}': {}", metric, diag);
            notices.push(Notice {
                section: format!("pcoa_{}", metric),
                reason: diag.to_string(),
            });
        }
    }

    info!("Report '{}' assembled with {} notices", config.name, notices.len());
    Ok(QcReport {
        name: config.name.clone(),
        sample_groups,
        compositions,
        group_depth,
        flow_cells,
        lowest_depth,
        replicates,
        qc_spreads,
        rarefaction,
        alpha,
        ordinations,
        notices,
    })
}
