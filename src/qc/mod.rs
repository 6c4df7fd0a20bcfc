//! Quality-control analyses over the loaded run artifacts.

mod composition;
mod depth;
mod rarefaction;
mod replicates;

pub use composition::{level_composition, taxon_spread, LevelComposition, TaxonSpread, TaxonSpreadRow};
pub use depth::{
    depth_by_group, flow_cell_depth_summary, lowest_depth_samples, FiveNumberSummary,
    FlowCellDepth, GroupDepthSummary, LowDepthSample, StageSummary,
};
pub use rarefaction::{rarefaction_sweep, RarefactionRow, RarefactionSweep};
pub use replicates::{
    cosine_similarity, pair_replicates, replicate_similarities, ReplicatePair, ReplicateReport,
    ReplicateSimilarity,
};
