//! Per-invocation runtime: configuration, plugin pool, engine and
//! cancellation.

use crate::cli::GlobalArgs;
use crate::config::CostConfig;
use crate::dismissal::DismissalStore;
use crate::engine::{Engine, ExecuteOptions};
use crate::plugin::{PluginPool, ResourceDescriptor};
use crate::routing::Router;
use crate::cache::Cache;
use anyhow::Context as _;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG_FILE: &str = "costmesh.toml";

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub config: CostConfig,
    pub config_path: Option<PathBuf>,
    pub json: bool,
    pub no_cache: bool,
    cancel: CancellationToken,
}

impl Context {
    /// Load configuration for this invocation.
    ///
    /// An explicit `--config` must exist. Without one, `./costmesh.toml` is
    /// used when present, otherwise defaults.
    pub fn load(global: &GlobalArgs) -> anyhow::Result<Self> {
        let config_path = match &global.config {
            Some(path) => Some(path.clone()),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.exists().then_some(local)
            }
        };
        let config = CostConfig::load(config_path.as_deref())?.with_env_overrides();
        Ok(Self::new(config, config_path, global))
    }

    pub fn new(config: CostConfig, config_path: Option<PathBuf>, global: &GlobalArgs) -> Self {
        let mut config = config;
        if let Some(level) = &global.log_level {
            config.logging.level = level.clone();
        }
        Self {
            config,
            config_path,
            json: global.json,
            no_cache: global.no_cache,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel in-flight plugin calls on Ctrl+C.
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received SIGINT, cancelling plugin calls");
                cancel.cancel();
            }
        });
    }

    pub fn options(&self) -> ExecuteOptions {
        let options = ExecuteOptions::default()
            .with_cancel(self.cancel.clone())
            .with_timeout(self.config.engine.timeout());
        if self.no_cache {
            options.without_cache()
        } else {
            options
        }
    }

    pub fn cache(&self) -> Cache {
        Cache::from_config(&self.config.cache)
    }

    pub fn dismissal_path(&self) -> PathBuf {
        self.config.dismissals.resolved_path()
    }

    pub fn load_dismissals(&self) -> anyhow::Result<DismissalStore> {
        let path = self.dismissal_path();
        DismissalStore::load(&path)
            .with_context(|| format!("Cannot use dismissal store {}", path.display()))
    }

    /// Validate configuration, connect every plugin and run `body` with an
    /// engine. Plugins are released whatever `body` returns.
    pub async fn with_engine<F, Fut, T>(&self, body: F) -> anyhow::Result<T>
    where
        F: FnOnce(Engine) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let report = self.config.validate()?;
        for warning in &report.warnings {
            tracing::warn!(%warning, "Routing configuration warning");
        }

        let pool = PluginPool::connect(&self.config.plugins).await;
        if !pool.unavailable().is_empty() && pool.is_empty() {
            tracing::warn!(
                unavailable = ?pool.unavailable(),
                "No cost plugin could be reached; every resource will report an error"
            );
        }
        let cache = Arc::new(self.cache());
        let routing = &self.config.routing;

        pool.scoped(|pool| async move {
            let router = Router::new(routing, pool.summaries())?;
            tracing::debug!(plugins = pool.len(), "Plugin pool ready");
            body(Engine::new(pool, Arc::new(router), cache)).await
        })
        .await
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResourceDocument {
    List(Vec<ResourceDescriptor>),
    Wrapped { resources: Vec<ResourceDescriptor> },
}

/// Read a resource set: a JSON array of descriptors or `{"resources": [...]}`.
pub fn read_resources(path: &Path) -> anyhow::Result<Vec<ResourceDescriptor>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read resources from {}", path.display()))?;
    let document: ResourceDocument = serde_json::from_str(&content)
        .with_context(|| format!("Invalid resource document {}", path.display()))?;
    Ok(match document {
        ResourceDocument::List(resources) => resources,
        ResourceDocument::Wrapped { resources } => resources,
    })
}

/// Parse RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_datetime(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': expected RFC 3339 or YYYY-MM-DD", value))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .with_context(|| format!("Invalid date '{}'", value))
}
