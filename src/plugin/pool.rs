//! Fixed pool of plugin clients held for one invocation.

use super::{Capability, CostPlugin, HttpPluginClient, PluginSummary};
use crate::config::PluginConfig;
use reqwest::Client;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One client per configured plugin, in declaration order.
///
/// The pool is acquired once per command and must be released with
/// [`PluginPool::close`]; [`PluginPool::scoped`] does that on every exit path.
pub struct PluginPool {
    plugins: Vec<Arc<dyn CostPlugin>>,
    /// Configured plugins that failed to connect
    unavailable: Vec<String>,
    closed: AtomicBool,
}

impl PluginPool {
    pub fn new(plugins: Vec<Arc<dyn CostPlugin>>) -> Self {
        Self {
            plugins,
            unavailable: Vec::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Connect to every configured plugin.
    ///
    /// A plugin that cannot be reached is left out of the pool with a warning,
    /// so its resources route elsewhere or fail per resource instead of
    /// aborting the command.
    pub async fn connect(configs: &[PluginConfig]) -> Self {
        let client = Arc::new(Client::new());
        let mut plugins: Vec<Arc<dyn CostPlugin>> = Vec::with_capacity(configs.len());
        let mut unavailable = Vec::new();

        for config in configs {
            match HttpPluginClient::connect(config, Arc::clone(&client)).await {
                Ok(plugin) => {
                    tracing::info!(
                        plugin = %config.name,
                        url = %config.url,
                        capabilities = ?plugin.capabilities(),
                        "Connected cost plugin"
                    );
                    plugins.push(Arc::new(plugin));
                }
                Err(e) => {
                    tracing::warn!(
                        plugin = %config.name,
                        url = %config.url,
                        error = %e,
                        "Cost plugin unavailable, continuing without it"
                    );
                    unavailable.push(config.name.clone());
                }
            }
        }

        let mut pool = Self::new(plugins);
        pool.unavailable = unavailable;
        pool
    }

    /// Run `body` with the pool and close every plugin afterwards, whatever
    /// `body` returned.
    pub async fn scoped<F, Fut, T>(self, body: F) -> T
    where
        F: FnOnce(Arc<PluginPool>) -> Fut,
        Fut: Future<Output = T>,
    {
        let pool = Arc::new(self);
        let output = body(Arc::clone(&pool)).await;
        pool.close().await;
        output
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CostPlugin>> {
        self.plugins.iter().find(|p| p.name() == name).cloned()
    }

    pub fn plugins(&self) -> &[Arc<dyn CostPlugin>] {
        &self.plugins
    }

    /// Names of configured plugins left out because they could not be reached.
    pub fn unavailable(&self) -> &[String] {
        &self.unavailable
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugins advertising `capability`, in declaration order.
    pub fn capable(&self, capability: Capability) -> Vec<Arc<dyn CostPlugin>> {
        self.plugins
            .iter()
            .filter(|p| p.supports(capability))
            .cloned()
            .collect()
    }

    pub fn summaries(&self) -> Vec<PluginSummary> {
        self.plugins
            .iter()
            .map(|p| PluginSummary::from(p.as_ref()))
            .collect()
    }

    /// Close every plugin once. Close failures are logged, never returned.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for plugin in &self.plugins {
            if let Err(e) = plugin.close().await {
                tracing::warn!(plugin = %plugin.name(), error = %e, "Failed to close plugin");
            }
        }
        tracing::debug!(count = self.plugins.len(), "Plugin pool released");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for PluginPool {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) && !self.plugins.is_empty() {
            tracing::warn!(
                count = self.plugins.len(),
                "Plugin pool dropped without close"
            );
        }
    }
}
