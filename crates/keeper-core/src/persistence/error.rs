//! Store error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Why the primary file could not be loaded.
///
/// Never surfaced to callers: the startup protocol recovers from every
/// variant.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("store file {0:?} does not exist")]
    Missing(PathBuf),

    #[error("failed to read store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
