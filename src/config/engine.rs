//! Engine and local state configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Dispatch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Command-level deadline for plugin calls. 0 disables it.
    pub timeout_secs: u64,
    /// Fetch recommendations alongside projected costs.
    pub recommendations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            recommendations: true,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Recommendation dismissal state file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DismissalConfig {
    /// Defaults to `<state dir>/dismissed.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl DismissalConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| super::default_state_dir().join("dismissed.json"))
    }
}
