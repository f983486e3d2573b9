//! Error types for the dismissal store

use crate::plugin::LifecycleStatus;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DismissalError {
    #[error("Failed to access dismissal store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but cannot be parsed. It is never silently reset.
    #[error("Dismissal store {path} is corrupted: {message}")]
    Corrupted { path: PathBuf, message: String },

    #[error("Dismissal store {path} has unsupported version {version}")]
    UnsupportedVersion { path: PathBuf, version: u64 },

    #[error("Cannot {action} recommendation '{id}' while it is {from}")]
    InvalidTransition {
        id: String,
        from: LifecycleStatus,
        action: &'static str,
    },

    #[error("No dismissal record for recommendation '{0}'")]
    NotFound(String),

    #[error("Snooze expiry {until} is not in the future")]
    SnoozeNotInFuture { until: DateTime<Utc> },

    #[error("Dismissal store {path} was modified by another process; retry")]
    ConcurrentModification { path: PathBuf },

    #[error("Failed to serialize dismissal store: {0}")]
    Serialize(#[from] serde_json::Error),
}
