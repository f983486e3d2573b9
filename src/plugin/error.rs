//! Error types for plugin operations.

use super::Capability;
use thiserror::Error;

/// Errors that can occur while calling a cost plugin.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginError {
    /// Network connectivity error (DNS, connection refused, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded deadline.
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Plugin returned an error response.
    #[error("Plugin error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Operation not implemented by this plugin.
    #[error("Operation '{0}' not supported by this plugin")]
    Unsupported(Capability),

    /// Plugin response doesn't match the protocol.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Plugin configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The call was abandoned because the command was cancelled.
    #[error("Cancelled")]
    Cancelled,
}

impl PluginError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, PluginError::Unsupported(_))
    }
}
