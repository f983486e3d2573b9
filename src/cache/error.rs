//! Error types for the result cache

use std::path::PathBuf;
use thiserror::Error;

/// Internal cache failures. Callers see these only through logs: every
/// failure degrades to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache entry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cache entry {path} is corrupted: {message}")]
    Corrupted { path: PathBuf, message: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
