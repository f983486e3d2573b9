//! Configuration module for costmesh
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`COSTMESH_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! The loaded [`CostConfig`] is immutable: it is built once per invocation and
//! handed to the router, engine and budget evaluator.
//!
//! # Example
//!
//! ```rust
//! use costmesh::config::CostConfig;
//!
//! let toml = r#"
//! [[plugins]]
//! name = "aws-public"
//! url = "http://127.0.0.1:7311"
//! capabilities = ["projected_cost"]
//!
//! [cache]
//! ttl_seconds = 600
//! "#;
//! let config: CostConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.plugins.len(), 1);
//! assert_eq!(config.cache.ttl_seconds, 600);
//! ```

pub mod budget;
pub mod cache;
pub mod engine;
pub mod error;
pub mod logging;
pub mod plugin;
pub mod routing;

pub use budget::{BudgetPeriod, BudgetsConfig, ScopedBudgetConfig, TagBudgetConfig};
pub use cache::CacheConfig;
pub use engine::{DismissalConfig, EngineConfig};
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use plugin::PluginConfig;
pub use routing::{PatternConfig, PatternField, PatternKind, RoutingConfig, RoutingRule};

use crate::plugin::PluginSummary;
use crate::routing::{validate_routing_config, ValidationReport};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Unified configuration for one costmesh invocation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CostConfig {
    /// Cost plugin endpoints, in declaration order
    pub plugins: Vec<PluginConfig>,
    /// Plugin routing rules
    pub routing: RoutingConfig,
    /// On-disk result cache
    pub cache: CacheConfig,
    /// Scoped budgets
    pub budgets: BudgetsConfig,
    /// Recommendation dismissal state
    pub dismissals: DismissalConfig,
    /// Dispatch settings
    pub engine: EngineConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Directory for local state (cache, dismissals).
///
/// `COSTMESH_HOME` wins, then `$HOME/.costmesh`, then `./.costmesh`.
pub fn default_state_dir() -> PathBuf {
    if let Ok(home) = std::env::var("COSTMESH_HOME") {
        if !home.is_empty() {
            return PathBuf::from(home);
        }
    }
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".costmesh")
}

impl CostConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports COSTMESH_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("COSTMESH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("COSTMESH_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        if let Ok(enabled) = std::env::var("COSTMESH_CACHE_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "true" | "1" => self.cache.enabled = true,
                "false" | "0" => self.cache.enabled = false,
                _ => {}
            }
        }
        if let Ok(dir) = std::env::var("COSTMESH_CACHE_DIR") {
            if !dir.is_empty() {
                self.cache.directory = Some(PathBuf::from(dir));
            }
        }
        if let Ok(ttl) = std::env::var("COSTMESH_CACHE_TTL") {
            if let Ok(t) = ttl.parse() {
                self.cache.ttl_seconds = t;
            }
        }

        if let Ok(path) = std::env::var("COSTMESH_DISMISSALS_PATH") {
            if !path.is_empty() {
                self.dismissals.path = Some(PathBuf::from(path));
            }
        }

        self
    }

    /// Plugin summaries as declared in configuration (capabilities may be
    /// empty when they are fetched at connect time).
    pub fn plugin_summaries(&self) -> Vec<PluginSummary> {
        self.plugins
            .iter()
            .map(|p| PluginSummary::new(p.name.clone(), p.capabilities.clone()))
            .collect()
    }

    /// Validate configuration before any plugin is called.
    ///
    /// Returns the routing warnings on success and every error, itemized, on
    /// failure.
    pub fn validate(&self) -> Result<ValidationReport, ConfigError> {
        self.validate_against(&self.plugin_summaries())
    }

    /// Validate against the plugins actually available (e.g. after probing
    /// capabilities).
    pub fn validate_against(
        &self,
        available: &[PluginSummary],
    ) -> Result<ValidationReport, ConfigError> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        for (i, plugin) in self.plugins.iter().enumerate() {
            if plugin.name.trim().is_empty() {
                errors.push(format!("plugins[{}].name cannot be empty", i));
            } else if !seen.insert(plugin.name.as_str()) {
                errors.push(format!(
                    "plugins[{}].name '{}' is declared more than once",
                    i, plugin.name
                ));
            }
            if plugin.url.trim().is_empty() {
                errors.push(format!("plugins[{}].url cannot be empty", i));
            }
        }

        if self.cache.enabled && self.cache.max_size_mb == 0 {
            errors.push("cache.max_size_mb must be > 0 when the cache is enabled".to_string());
        }

        let report = validate_routing_config(&self.routing.rules, available);
        errors.extend(report.errors.iter().cloned());
        errors.extend(self.budgets.validate());

        if errors.is_empty() {
            Ok(ValidationReport {
                errors: Vec::new(),
                warnings: report.warnings,
            })
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}
