//! Shared test utilities for costmesh integration tests.
//!
//! Provides an in-process mock cost plugin and helpers for building
//! resources, pools and engines.

#![allow(dead_code)]

use async_trait::async_trait;
use costmesh::cache::Cache;
use costmesh::config::RoutingConfig;
use costmesh::engine::Engine;
use costmesh::plugin::{
    ActionType, Capability, CostPlugin, CostResult, CostWindow, DismissRequest, LifecycleStatus,
    PluginError, PluginPool, Recommendation, ResourceDescriptor,
};
use costmesh::routing::Router;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Resource Builders
// =============================================================================

pub fn ec2(id: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(id, "aws:ec2/instance:Instance")
}

pub fn gce(id: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(id, "gcp:compute/instance:Instance")
}

pub fn recommendation(id: &str, resource_id: &str, savings: f64) -> Recommendation {
    Recommendation {
        id: id.to_string(),
        resource_id: resource_id.to_string(),
        action_type: ActionType::Rightsize,
        description: format!("Rightsize {}", resource_id),
        estimated_savings: savings,
        currency: "USD".to_string(),
        status: LifecycleStatus::Active,
        plugin: String::new(),
    }
}

// =============================================================================
// Mock Plugin
// =============================================================================

/// In-process plugin with canned answers.
pub struct MockPlugin {
    name: String,
    capabilities: Vec<Capability>,
    /// Monthly cost per resource id. Unknown ids are omitted from responses.
    costs: HashMap<String, f64>,
    recommendations: Vec<Recommendation>,
    fail_with: Option<PluginError>,
    delay: Option<Duration>,
    pub calls: Arc<AtomicUsize>,
    pub dismissals: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

impl MockPlugin {
    pub fn new(name: &str, capabilities: &[Capability]) -> Self {
        Self {
            name: name.to_string(),
            capabilities: capabilities.to_vec(),
            costs: HashMap::new(),
            recommendations: Vec::new(),
            fail_with: None,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            dismissals: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Projected and actual cost plugin.
    pub fn pricing(name: &str) -> Self {
        Self::new(name, &[Capability::ProjectedCost, Capability::ActualCost])
    }

    pub fn with_cost(mut self, resource_id: &str, monthly: f64) -> Self {
        self.costs.insert(resource_id.to_string(), monthly);
        self
    }

    pub fn with_recommendation(mut self, rec: Recommendation) -> Self {
        if !self.capabilities.contains(&Capability::Recommendations) {
            self.capabilities.push(Capability::Recommendations);
        }
        self.recommendations.push(rec);
        self
    }

    pub fn failing(mut self, error: PluginError) -> Self {
        self.fail_with = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), PluginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn price(&self, resources: &[ResourceDescriptor]) -> Vec<CostResult> {
        resources
            .iter()
            .filter_map(|r| {
                self.costs.get(&r.id).map(|monthly| {
                    let mut result = CostResult::new(r.id.clone(), *monthly);
                    result.resource_type = r.resource_type.clone();
                    result
                })
            })
            .collect()
    }
}

#[async_trait]
impl CostPlugin for MockPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn projected_cost(
        &self,
        resources: &[ResourceDescriptor],
    ) -> Result<Vec<CostResult>, PluginError> {
        self.enter().await?;
        Ok(self.price(resources))
    }

    async fn actual_cost(
        &self,
        resources: &[ResourceDescriptor],
        _window: &CostWindow,
    ) -> Result<Vec<CostResult>, PluginError> {
        self.enter().await?;
        Ok(self.price(resources))
    }

    async fn recommendations(
        &self,
        _resources: &[ResourceDescriptor],
    ) -> Result<Vec<Recommendation>, PluginError> {
        self.enter().await?;
        Ok(self.recommendations.clone())
    }

    async fn dismiss_recommendation(&self, _request: &DismissRequest) -> Result<(), PluginError> {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), PluginError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Engine Builders
// =============================================================================

pub fn pool_of(plugins: Vec<MockPlugin>) -> Arc<PluginPool> {
    let plugins: Vec<Arc<dyn CostPlugin>> = plugins
        .into_iter()
        .map(|p| Arc::new(p) as Arc<dyn CostPlugin>)
        .collect();
    Arc::new(PluginPool::new(plugins))
}

/// Engine with automatic routing and no cache.
pub fn engine_of(plugins: Vec<MockPlugin>) -> Engine {
    engine_with(plugins, &RoutingConfig::default(), Cache::disabled())
}

pub fn engine_with(plugins: Vec<MockPlugin>, routing: &RoutingConfig, cache: Cache) -> Engine {
    let pool = pool_of(plugins);
    let router = Router::new(routing, pool.summaries()).unwrap();
    Engine::new(pool, Arc::new(router), Arc::new(cache))
}
