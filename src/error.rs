//! Errors that abort loading a catalog file.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The file is missing, unreadable, or the CSV stream could not be read.
    #[error("catalog data unavailable at {}: {message}", path.display())]
    DataUnavailable { path: PathBuf, message: String },

    /// Required columns are absent from the header row.
    #[error("catalog schema mismatch: missing column(s) {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
}

impl CatalogError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        CatalogError::DataUnavailable {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
