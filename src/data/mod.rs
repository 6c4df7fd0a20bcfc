//! Data structures for the QC report inputs.

mod abundance;
mod denoising;
mod distance;
mod manifest;
mod totals;

pub use abundance::{AbundanceTable, RelativeAbundanceTable};
pub use denoising::{DenoisingStats, SampleReadCounts, Stage};
pub use distance::DistanceMatrix;
pub use manifest::{
    is_blank_id, SampleManifest, EXTERNAL_ID, PCR_PLATE, RUN_ID, SAMPLE_TYPE, SEQUENCER,
    SOURCE_PCR_PLATE,
};
pub use totals::FeatureTotals;
