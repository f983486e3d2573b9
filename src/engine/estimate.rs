//! What-if cost estimates
//!
//! Uses a plugin's native estimate when one is routed. Otherwise the estimate
//! is derived from two projected-cost calls: the resource as-is and the
//! resource with its overrides applied.

use super::{CallGuard, Engine, EngineError, ErrorKind, ExecuteOptions, ResourceError};
use crate::plugin::{Capability, EstimateResult, PluginError, ResourceDescriptor};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One resource and the property changes to price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateItem {
    pub resource: ResourceDescriptor,
    #[serde(default)]
    pub overrides: Map<String, Value>,
}

impl EstimateItem {
    pub fn new(resource: ResourceDescriptor, overrides: Map<String, Value>) -> Self {
        Self {
            resource,
            overrides,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EstimateOutcome {
    pub results: Vec<EstimateResult>,
    pub errors: Vec<ResourceError>,
}

impl EstimateOutcome {
    pub fn total_delta(&self) -> f64 {
        self.results.iter().map(|r| r.delta).sum()
    }
}

impl Engine {
    /// Estimate every item concurrently. A single item is the single-resource
    /// mode; several items are a plan modification.
    pub async fn estimate(
        &self,
        items: &[EstimateItem],
        options: &ExecuteOptions,
    ) -> Result<EstimateOutcome, EngineError> {
        let resources: Vec<ResourceDescriptor> = items.iter().map(|i| i.resource.clone()).collect();
        Self::validate_batch(&resources)?;

        let guard = CallGuard::new(options);
        let runs = items.iter().map(|item| self.estimate_one(item, &guard));

        let mut outcome = EstimateOutcome::default();
        for result in join_all(runs).await {
            match result {
                Ok(estimate) => outcome.results.push(estimate),
                Err(error) => outcome.errors.push(error),
            }
        }
        Ok(outcome)
    }

    async fn estimate_one(
        &self,
        item: &EstimateItem,
        guard: &CallGuard,
    ) -> Result<EstimateResult, ResourceError> {
        let resource = &item.resource;
        let mut last_error: Option<ResourceError> = None;

        for name in self.router.resolve(resource, Capability::EstimateCost) {
            let Some(plugin) = self.pool.get(&name) else {
                continue;
            };
            match guard.run(plugin.estimate_cost(resource, &item.overrides)).await {
                Ok(mut estimate) => {
                    if estimate.plugin.is_empty() {
                        estimate.plugin = name;
                    }
                    if estimate.resource_id.is_empty() {
                        estimate.resource_id = resource.id.clone();
                    }
                    return Ok(estimate);
                }
                Err(PluginError::Cancelled) => return Err(ResourceError::cancelled(&resource.id)),
                Err(e) => {
                    tracing::debug!(plugin = %name, resource = %resource.id, error = %e, "Native estimate failed");
                    last_error = Some(ResourceError::from_plugin(&resource.id, &name, &e));
                }
            }
        }

        let modified = resource.with_overrides(&item.overrides);
        for name in self.router.resolve(resource, Capability::ProjectedCost) {
            let Some(plugin) = self.pool.get(&name) else {
                continue;
            };

            let pair = guard
                .run(async {
                    let baseline = plugin.projected_cost(std::slice::from_ref(resource)).await?;
                    let changed = plugin.projected_cost(std::slice::from_ref(&modified)).await?;
                    Ok::<_, PluginError>((baseline, changed))
                })
                .await;

            match pair {
                Ok((baseline, changed)) => {
                    let find = |results: &[crate::plugin::CostResult]| {
                        results
                            .iter()
                            .find(|r| r.resource_id == resource.id && !r.is_error())
                            .cloned()
                    };
                    match (find(&baseline), find(&changed)) {
                        (Some(before), Some(after)) => {
                            tracing::debug!(plugin = %name, resource = %resource.id, "Estimated from projected costs");
                            return Ok(EstimateResult {
                                resource_id: resource.id.clone(),
                                baseline: before.monthly,
                                modified: after.monthly,
                                delta: after.monthly - before.monthly,
                                currency: before.currency,
                                plugin: name,
                                fallback: true,
                            });
                        }
                        _ => {
                            last_error = Some(ResourceError::new(
                                &resource.id,
                                Some(name.as_str()),
                                ErrorKind::MissingResult,
                                "no projected cost returned for estimate",
                            ));
                        }
                    }
                }
                Err(PluginError::Cancelled) => return Err(ResourceError::cancelled(&resource.id)),
                Err(e) => last_error = Some(ResourceError::from_plugin(&resource.id, &name, &e)),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ResourceError::new(
                &resource.id,
                None,
                ErrorKind::NoPlugin,
                format!(
                    "no plugin supports estimate_cost or projected_cost for type '{}'",
                    resource.resource_type
                ),
            )
        }))
    }
}
