//! Report configuration, assembly, and serialization.

mod config;
mod runner;
mod summary;

pub use config::{ReportConfig, ReportParams};
pub use runner::run_report;
pub use summary::{Notice, QcPopulationSpread, QcReport};
