//! Amplicon Sequencing QC and Diversity Metrics Library
//!
//! This library computes the quality-control and diversity summaries for an
//! amplicon sequencing run from the tabular artifacts an upstream pipeline
//! leaves behind: the sample manifest, per-level taxonomic abundance tables,
//! denoising stage counts, per-sample feature totals, alpha-diversity
//! exports, and beta-diversity distance matrices.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Input artifacts (SampleManifest, AbundanceTable,
//!   DenoisingStats, FeatureTotals, DistanceMatrix)
//! - **qc**: Quality-control analyses (composition, read depth, replicate
//!   concordance, rarefaction retention)
//! - **diversity**: Diversity post-processing (alpha reshaping, PCoA)
//! - **report**: Report configuration, assembly, and serialization
//!
//! # Example
//!
//! ```no_run
//! use amplicon_qc::prelude::*;
//!
//! // Describe the run artifacts
//! let config = ReportConfig::from_yaml("qc.yaml").unwrap();
//!
//! // Compute every section
//! let report = run_report(&config).unwrap();
//! report.write_tables("qc_out").unwrap();
//! ```

pub mod data;
pub mod diversity;
pub mod error;
pub mod qc;
pub mod report;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{
        AbundanceTable, DenoisingStats, DistanceMatrix, FeatureTotals, RelativeAbundanceTable,
        SampleManifest, SampleReadCounts, Stage,
    };
    pub use crate::diversity::{
        pcoa, reshape_alpha, AlphaLong, AlphaObservation, Eigenpair,
        NegativeEigenvalueDiagnostic, PcoaResult,
    };
    pub use crate::error::{QcError, Result};
    pub use crate::qc::{
        depth_by_group, flow_cell_depth_summary, level_composition, lowest_depth_samples,
        pair_replicates, rarefaction_sweep, replicate_similarities, taxon_spread,
        FiveNumberSummary, FlowCellDepth, GroupDepthSummary, LevelComposition, LowDepthSample,
        RarefactionRow, RarefactionSweep, ReplicatePair, ReplicateReport, ReplicateSimilarity,
        StageSummary, TaxonSpread, TaxonSpreadRow,
    };
    pub use crate::report::{
        run_report, Notice, QcPopulationSpread, QcReport, ReportConfig, ReportParams,
    };
}
