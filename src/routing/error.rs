//! Error types for routing configuration

use thiserror::Error;

/// Errors raised while compiling routing rules
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// A glob or regex pattern failed to compile
    #[error("Invalid {kind} pattern '{pattern}': {message}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        message: String,
    },

    /// A rule lists a feature that is not a known capability
    #[error("Invalid feature '{feature}' in rule for plugin '{plugin}'")]
    InvalidFeature { plugin: String, feature: String },

    /// A rule has nothing to match against
    #[error("Rule for plugin '{plugin}' has no patterns")]
    EmptyRule { plugin: String },
}
