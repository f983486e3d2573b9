//! Error types for the dispatch engine

use crate::dismissal::DismissalError;
use crate::plugin::PluginError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failures that stop an operation before (or instead of) dispatch.
///
/// Per-resource problems are never `EngineError`s; they are recorded as
/// [`ResourceError`] data in the batch outcome.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid cost window: from {from} is not before to {to}")]
    InvalidWindow {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("Resource id '{0}' appears more than once in the batch")]
    DuplicateResource(String),

    #[error("Recommendation '{0}' not found in plugin output or local state")]
    RecommendationNotFound(String),

    #[error(transparent)]
    Dismissal(#[from] DismissalError),
}

/// Why a resource has no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No configured plugin advertises the operation for this resource.
    NoPlugin,
    /// The plugin call failed or the plugin reported an error for the resource.
    Plugin,
    /// The plugin answered but left this resource out.
    MissingResult,
    Unsupported,
    Timeout,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::NoPlugin => "no_plugin",
            ErrorKind::Plugin => "plugin",
            ErrorKind::MissingResult => "missing_result",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        })
    }
}

impl From<&PluginError> for ErrorKind {
    fn from(error: &PluginError) -> Self {
        match error {
            PluginError::Unsupported(_) => ErrorKind::Unsupported,
            PluginError::Timeout(_) => ErrorKind::Timeout,
            PluginError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Plugin,
        }
    }
}

/// A resource that could not be resolved, rendered apart from primary output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceError {
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ResourceError {
    pub fn new(
        resource_id: impl Into<String>,
        plugin: Option<&str>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            plugin: plugin.map(String::from),
            kind,
            message: message.into(),
        }
    }

    pub fn from_plugin(resource_id: &str, plugin: &str, error: &PluginError) -> Self {
        Self::new(resource_id, Some(plugin), error.into(), error.to_string())
    }

    pub fn cancelled(resource_id: &str) -> Self {
        Self::new(resource_id, None, ErrorKind::Cancelled, "operation cancelled")
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.plugin {
            Some(plugin) => write!(f, "{} [{}]: {}", self.resource_id, plugin, self.message),
            None => write!(f, "{}: {}", self.resource_id, self.message),
        }
    }
}

/// A whole-plugin failure in operations that call every plugin with the full
/// resource set (recommendations).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginFailure {
    pub plugin: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl PluginFailure {
    pub fn new(plugin: &str, error: &PluginError) -> Self {
        Self {
            plugin: plugin.to_string(),
            kind: error.into(),
            message: error.to_string(),
        }
    }
}
