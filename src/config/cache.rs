//! Result cache configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache directory. Defaults to `<state dir>/cache`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub ttl_seconds: u64,
    pub max_size_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            ttl_seconds: 3600,
            max_size_mb: 100,
        }
    }
}

impl CacheConfig {
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| super::default_state_dir().join("cache"))
    }
}
