//! Error types for the amplicon-qc library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum QcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required artifact '{label}': {path}")]
    MissingArtifact { label: String, path: PathBuf },

    #[error("Invalid value '{value}' at row {row}, column '{column}' in {path}")]
    InvalidValue {
        value: String,
        row: usize,
        column: String,
        path: PathBuf,
    },

    #[error("Malformed matrix in {path}: {reason}")]
    MalformedMatrix { path: PathBuf, reason: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Sample ID mismatch: {0}")]
    SampleMismatch(String),

    #[error("Missing column '{0}' in manifest")]
    MissingColumn(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QcError {
    /// Builds a `MissingArtifact` error for a labeled input file.
    pub fn missing_artifact(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        QcError::MissingArtifact {
            label: label.into(),
            path: path.into(),
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, QcError>;
