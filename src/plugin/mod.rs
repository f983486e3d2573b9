//! Cost plugin abstraction layer.
//!
//! This module provides the `CostPlugin` trait and supporting types that abstract
//! the RPC protocol spoken by external cost plugins (one per provider or billing
//! data source). The engine only ever talks to `Arc<dyn CostPlugin>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod error;
pub mod http;
pub mod pool;
pub mod types;

pub use error::PluginError;
pub use http::HttpPluginClient;
pub use pool::PluginPool;
pub use types::{
    provider_from_type, ActionType, Capability, CostResult, CostWindow, DismissRequest,
    EstimateResult, LifecycleStatus, Recommendation, ResourceDescriptor,
};

/// Unified interface for all cost plugins.
///
/// Encapsulates the plugin wire protocol and capability flags. Every operation
/// is optional: the default implementations return `PluginError::Unsupported`,
/// so callers must check `supports()` (or handle `Unsupported`) and never assume
/// universal support.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn CostPlugin>`.
///
/// # Cancellation Safety
///
/// All async methods are cancellation-safe. Dropping a future aborts the
/// in-flight RPC.
#[async_trait]
pub trait CostPlugin: Send + Sync + 'static {
    /// Configured plugin name (unique within one invocation).
    fn name(&self) -> &str;

    /// Operations this plugin advertises.
    fn capabilities(&self) -> &[Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Projected monthly cost for each resource.
    ///
    /// Results are keyed by `CostResult::resource_id`; resources the plugin
    /// cannot price may be omitted or returned with `error` set.
    async fn projected_cost(
        &self,
        _resources: &[ResourceDescriptor],
    ) -> Result<Vec<CostResult>, PluginError> {
        Err(PluginError::Unsupported(Capability::ProjectedCost))
    }

    /// Billed cost for each resource over `window`.
    async fn actual_cost(
        &self,
        _resources: &[ResourceDescriptor],
        _window: &CostWindow,
    ) -> Result<Vec<CostResult>, PluginError> {
        Err(PluginError::Unsupported(Capability::ActualCost))
    }

    /// Cost-saving recommendations for the given resources.
    ///
    /// Plugins may key recommendations by cloud-native IDs instead of the
    /// infra-as-code URN.
    async fn recommendations(
        &self,
        _resources: &[ResourceDescriptor],
    ) -> Result<Vec<Recommendation>, PluginError> {
        Err(PluginError::Unsupported(Capability::Recommendations))
    }

    /// What-if estimate for `resource` with `overrides` applied to its properties.
    async fn estimate_cost(
        &self,
        _resource: &ResourceDescriptor,
        _overrides: &Map<String, Value>,
    ) -> Result<EstimateResult, PluginError> {
        Err(PluginError::Unsupported(Capability::EstimateCost))
    }

    /// Record a dismissal on the plugin side.
    async fn dismiss_recommendation(&self, _request: &DismissRequest) -> Result<(), PluginError> {
        Err(PluginError::Unsupported(Capability::Dismiss))
    }

    /// Release the plugin connection. Called exactly once by `PluginPool`.
    async fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Name and advertised capabilities of a plugin, as seen by the router and
/// the routing validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSummary {
    pub name: String,
    pub capabilities: Vec<Capability>,
}

impl PluginSummary {
    pub fn new(name: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            name: name.into(),
            capabilities,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

impl From<&dyn CostPlugin> for PluginSummary {
    fn from(plugin: &dyn CostPlugin) -> Self {
        Self {
            name: plugin.name().to_string(),
            capabilities: plugin.capabilities().to_vec(),
        }
    }
}
