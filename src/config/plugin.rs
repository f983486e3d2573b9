//! Plugin configuration

use crate::plugin::Capability;
use serde::{Deserialize, Serialize};

/// One cost plugin endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    pub url: String,
    /// Advertised operations. Empty means "ask the plugin".
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}
