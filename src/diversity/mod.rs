//! Alpha- and beta-diversity post-processing.

mod alpha;
mod pcoa;

pub use alpha::{reshape_alpha, AlphaLong, AlphaObservation};
pub use pcoa::{pcoa, Eigenpair, NegativeEigenvalueDiagnostic, PcoaResult};
