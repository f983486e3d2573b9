//! Dispatch engine
//!
//! Fans cost operations out to routed plugins concurrently, merges
//! per-resource results, and records every failure as data so one bad plugin
//! never aborts the batch.
//!
//! # Flow
//!
//! 1. Validate the batch (unique ids, well-formed window)
//! 2. Consult the [`Cache`] by fingerprint
//! 3. Route each resource and partition by plugin chain
//! 4. Run partitions concurrently; each tries its chain in order
//! 5. Merge results by original position; cache only error-free batches

pub mod background;
pub mod correlate;
pub mod dismiss;
pub mod error;
pub mod estimate;

pub use background::{spawn_supervised, BackgroundTask};
pub use correlate::{attach_recommendations, Correlator};
pub use dismiss::{DismissAction, DismissOutcome};
pub use error::{EngineError, ErrorKind, PluginFailure, ResourceError};
pub use estimate::{EstimateItem, EstimateOutcome};

use crate::cache::{fingerprint, Cache};
use crate::plugin::{
    ActionType, Capability, CostPlugin, CostResult, CostWindow, PluginError, PluginPool,
    Recommendation, ResourceDescriptor,
};
use crate::routing::Router;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A cost query dispatched per resource.
#[derive(Debug, Clone, PartialEq)]
pub enum CostOperation {
    Projected,
    Actual(CostWindow),
}

impl CostOperation {
    pub fn capability(&self) -> Capability {
        match self {
            CostOperation::Projected => Capability::ProjectedCost,
            CostOperation::Actual(_) => Capability::ActualCost,
        }
    }

    /// Parameters that distinguish otherwise identical cache keys.
    fn params(&self) -> Value {
        match self {
            CostOperation::Projected => Value::Null,
            CostOperation::Actual(window) => json!(window),
        }
    }

    async fn invoke(
        &self,
        plugin: &dyn CostPlugin,
        resources: &[ResourceDescriptor],
    ) -> Result<Vec<CostResult>, PluginError> {
        match self {
            CostOperation::Projected => plugin.projected_cost(resources).await,
            CostOperation::Actual(window) => plugin.actual_cost(resources, window).await,
        }
    }
}

/// Per-call controls.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub cancel: CancellationToken,
    /// Deadline for the whole operation, measured from dispatch.
    pub timeout: Option<Duration>,
    pub use_cache: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout: None,
            use_cache: true,
        }
    }
}

impl ExecuteOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Outcome of a cost operation: every resource is in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// Successful results in input order.
    pub results: Vec<CostResult>,
    pub errors: Vec<ResourceError>,
    #[serde(skip)]
    pub from_cache: bool,
}

impl BatchOutcome {
    pub fn total_monthly(&self) -> f64 {
        self.results.iter().map(|r| r.monthly).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Recommendations gathered from every capable plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendationOutcome {
    pub recommendations: Vec<Recommendation>,
    pub errors: Vec<PluginFailure>,
}

/// Count and savings for one action type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ActionSummary {
    pub count: usize,
    pub savings: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendationSummary {
    pub count: usize,
    pub total_savings: f64,
    pub by_action: BTreeMap<ActionType, ActionSummary>,
}

/// Totals per action type.
pub fn summarize(recommendations: &[Recommendation]) -> RecommendationSummary {
    let mut summary = RecommendationSummary::default();
    for rec in recommendations {
        summary.count += 1;
        summary.total_savings += rec.estimated_savings;
        let entry = summary.by_action.entry(rec.action_type).or_default();
        entry.count += 1;
        entry.savings += rec.estimated_savings;
    }
    summary
}

/// Client-side recommendation filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationFilter {
    /// Empty means every action type.
    pub action_types: Vec<ActionType>,
    pub min_savings: Option<f64>,
}

impl RecommendationFilter {
    pub fn matches(&self, rec: &Recommendation) -> bool {
        (self.action_types.is_empty() || self.action_types.contains(&rec.action_type))
            && self.min_savings.map_or(true, |min| rec.estimated_savings >= min)
    }

    pub fn apply(&self, recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
        recommendations.into_iter().filter(|r| self.matches(r)).collect()
    }
}

/// Cancellation and deadline shared by every call in one operation.
#[derive(Debug, Clone)]
struct CallGuard {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    timeout_ms: u64,
}

impl CallGuard {
    fn new(options: &ExecuteOptions) -> Self {
        Self {
            cancel: options.cancel.clone(),
            deadline: options.timeout.map(|t| Instant::now() + t),
            timeout_ms: options.timeout.map_or(0, |t| t.as_millis() as u64),
        }
    }

    /// Whether the operation-wide deadline has passed.
    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Run `call`, giving up on cancellation or when the deadline passes.
    async fn run<T>(
        &self,
        call: impl Future<Output = Result<T, PluginError>>,
    ) -> Result<T, PluginError> {
        let timed = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, call)
                    .await
                    .unwrap_or(Err(PluginError::Timeout(self.timeout_ms))),
                None => call.await,
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PluginError::Cancelled),
            result = timed => result,
        }
    }
}

/// Engine ties the plugin pool, router and cache together for one invocation.
#[derive(Clone)]
pub struct Engine {
    pool: Arc<PluginPool>,
    router: Arc<Router>,
    cache: Arc<Cache>,
}

impl Engine {
    pub fn new(pool: Arc<PluginPool>, router: Arc<Router>, cache: Arc<Cache>) -> Self {
        Self {
            pool,
            router,
            cache,
        }
    }

    pub fn pool(&self) -> &Arc<PluginPool> {
        &self.pool
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    fn validate_batch(resources: &[ResourceDescriptor]) -> Result<(), EngineError> {
        let mut seen = HashSet::with_capacity(resources.len());
        for resource in resources {
            if !seen.insert(resource.id.as_str()) {
                return Err(EngineError::DuplicateResource(resource.id.clone()));
            }
        }
        Ok(())
    }

    /// Run a cost operation across `resources`.
    ///
    /// Only pre-dispatch validation fails the call; every per-resource problem
    /// is returned in [`BatchOutcome::errors`].
    pub async fn execute(
        &self,
        operation: &CostOperation,
        resources: &[ResourceDescriptor],
        options: &ExecuteOptions,
    ) -> Result<BatchOutcome, EngineError> {
        if let CostOperation::Actual(window) = operation {
            if !window.is_valid() {
                return Err(EngineError::InvalidWindow {
                    from: window.from,
                    to: window.to,
                });
            }
        }
        Self::validate_batch(resources)?;

        let capability = operation.capability();
        if options.cancel.is_cancelled() {
            return Ok(BatchOutcome {
                errors: resources.iter().map(|r| ResourceError::cancelled(&r.id)).collect(),
                ..Default::default()
            });
        }

        let use_cache = options.use_cache && self.cache.is_enabled();
        let key = use_cache.then(|| fingerprint(capability.as_str(), resources, &operation.params()));
        if let Some(key) = &key {
            if let Some(results) = self.cache.get::<Vec<CostResult>>(key) {
                tracing::info!(operation = %capability, resources = resources.len(), "Served from cache");
                return Ok(BatchOutcome {
                    results,
                    errors: Vec::new(),
                    from_cache: true,
                });
            }
        }

        let mut slots: Vec<Option<Result<CostResult, ResourceError>>> =
            (0..resources.len()).map(|_| None).collect();

        // Partition by plugin chain, preserving first-seen order.
        let mut partitions: Vec<(Vec<String>, Vec<usize>)> = Vec::new();
        for (i, resource) in resources.iter().enumerate() {
            let chain = self.router.resolve(resource, capability);
            if chain.is_empty() {
                slots[i] = Some(Err(ResourceError::new(
                    &resource.id,
                    None,
                    ErrorKind::NoPlugin,
                    format!("no plugin supports {} for type '{}'", capability, resource.resource_type),
                )));
                continue;
            }
            match partitions.iter_mut().find(|(c, _)| *c == chain) {
                Some((_, indices)) => indices.push(i),
                None => partitions.push((chain, vec![i])),
            }
        }

        tracing::debug!(
            operation = %capability,
            resources = resources.len(),
            partitions = partitions.len(),
            "Dispatching cost operation"
        );

        let guard = CallGuard::new(options);
        let runs = partitions
            .iter()
            .map(|(chain, indices)| self.run_chain(operation, chain, indices, resources, &guard));
        for partition in join_all(runs).await {
            for (i, outcome) in partition {
                slots[i] = Some(outcome);
            }
        }

        let mut outcome = BatchOutcome::default();
        for (i, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(result)) => outcome.results.push(result),
                Some(Err(error)) => outcome.errors.push(error),
                None => outcome.errors.push(ResourceError::new(
                    &resources[i].id,
                    None,
                    ErrorKind::MissingResult,
                    "no result returned",
                )),
            }
        }

        if outcome.errors.is_empty() {
            if let Some(key) = &key {
                self.cache.put(key, &outcome.results);
            }
        } else {
            tracing::warn!(
                operation = %capability,
                failed = outcome.errors.len(),
                succeeded = outcome.results.len(),
                "Cost operation completed with errors"
            );
        }

        Ok(outcome)
    }

    /// Try each plugin in `chain` for the still-unresolved resources of one
    /// partition. Errors are kept only for resources every plugin failed.
    async fn run_chain(
        &self,
        operation: &CostOperation,
        chain: &[String],
        indices: &[usize],
        resources: &[ResourceDescriptor],
        guard: &CallGuard,
    ) -> Vec<(usize, Result<CostResult, ResourceError>)> {
        let capability = operation.capability();
        let mut resolved = Vec::with_capacity(indices.len());
        let mut pending: Vec<usize> = indices.to_vec();
        let mut failures: HashMap<usize, ResourceError> = HashMap::new();

        for name in chain {
            if pending.is_empty() {
                break;
            }
            let Some(plugin) = self.pool.get(name) else {
                for &i in &pending {
                    failures.insert(
                        i,
                        ResourceError::new(
                            &resources[i].id,
                            Some(name.as_str()),
                            ErrorKind::NoPlugin,
                            format!("plugin '{}' is not connected", name),
                        ),
                    );
                }
                continue;
            };

            let batch: Vec<ResourceDescriptor> =
                pending.iter().map(|&i| resources[i].clone()).collect();
            metrics::counter!(
                "costmesh_plugin_calls_total",
                "plugin" => name.clone(),
                "operation" => capability.as_str()
            )
            .increment(1);

            let started = std::time::Instant::now();
            let response = guard.run(operation.invoke(plugin.as_ref(), &batch)).await;
            tracing::debug!(
                plugin = %name,
                operation = %capability,
                resources = batch.len(),
                latency_ms = started.elapsed().as_millis() as u64,
                ok = response.is_ok(),
                "Plugin call finished"
            );

            match response {
                Ok(results) => {
                    let mut by_id: HashMap<String, CostResult> = results
                        .into_iter()
                        .map(|r| (r.resource_id.clone(), r))
                        .collect();
                    let mut still_pending = Vec::new();
                    for i in pending {
                        let resource = &resources[i];
                        match by_id.remove(&resource.id) {
                            Some(result) if result.is_error() => {
                                let message = result.error.unwrap_or_default();
                                failures.insert(
                                    i,
                                    ResourceError::new(&resource.id, Some(name.as_str()), ErrorKind::Plugin, message),
                                );
                                still_pending.push(i);
                            }
                            Some(mut result) => {
                                if result.plugin.is_empty() {
                                    result.plugin = name.clone();
                                }
                                if result.resource_type.is_empty() {
                                    result.resource_type = resource.resource_type.clone();
                                }
                                failures.remove(&i);
                                resolved.push((i, Ok(result)));
                            }
                            None => {
                                failures.insert(
                                    i,
                                    ResourceError::new(
                                        &resource.id,
                                        Some(name.as_str()),
                                        ErrorKind::MissingResult,
                                        "no result returned",
                                    ),
                                );
                                still_pending.push(i);
                            }
                        }
                    }
                    pending = still_pending;
                }
                Err(PluginError::Cancelled) => {
                    for &i in &pending {
                        failures.insert(i, ResourceError::cancelled(&resources[i].id));
                    }
                    break;
                }
                Err(e) => {
                    metrics::counter!(
                        "costmesh_plugin_failures_total",
                        "plugin" => name.clone(),
                        "operation" => capability.as_str()
                    )
                    .increment(1);
                    tracing::warn!(
                        plugin = %name,
                        operation = %capability,
                        resources = pending.len(),
                        error = %e,
                        "Plugin call failed"
                    );
                    for &i in &pending {
                        failures.insert(i, ResourceError::from_plugin(&resources[i].id, name, &e));
                    }
                    // A plugin's own request timeout moves on to the next plugin;
                    // the operation deadline ends the chain.
                    if matches!(e, PluginError::Timeout(_)) && guard.expired() {
                        break;
                    }
                }
            }
        }

        for i in pending {
            let error = failures.remove(&i).unwrap_or_else(|| {
                ResourceError::new(&resources[i].id, None, ErrorKind::MissingResult, "no result returned")
            });
            resolved.push((i, Err(error)));
        }
        resolved
    }

    /// Fetch recommendations from every plugin routed for any resource.
    ///
    /// Each selected plugin receives the full resource set, since plugins may
    /// key recommendations by identifiers other than the primary id.
    pub async fn recommendations(
        &self,
        resources: &[ResourceDescriptor],
        options: &ExecuteOptions,
    ) -> Result<RecommendationOutcome, EngineError> {
        Self::validate_batch(resources)?;

        let mut selected: Vec<String> = Vec::new();
        for resource in resources {
            for name in self.router.resolve(resource, Capability::Recommendations) {
                if !selected.contains(&name) {
                    selected.push(name);
                }
            }
        }
        if selected.is_empty() {
            tracing::debug!("No plugin offers recommendations for this resource set");
            return Ok(RecommendationOutcome::default());
        }

        let guard = CallGuard::new(options);
        let calls = selected.iter().map(|name| {
            let guard = &guard;
            async move {
                let Some(plugin) = self.pool.get(name) else {
                    return (
                        name.as_str(),
                        Err(PluginError::Configuration(format!("plugin '{}' is not connected", name))),
                    );
                };
                metrics::counter!(
                    "costmesh_plugin_calls_total",
                    "plugin" => name.clone(),
                    "operation" => Capability::Recommendations.as_str()
                )
                .increment(1);
                (name.as_str(), guard.run(plugin.recommendations(resources)).await)
            }
        });

        let mut outcome = RecommendationOutcome::default();
        for (name, response) in join_all(calls).await {
            match response {
                Ok(recs) => {
                    tracing::debug!(plugin = name, count = recs.len(), "Received recommendations");
                    outcome.recommendations.extend(recs.into_iter().map(|mut rec| {
                        if rec.plugin.is_empty() {
                            rec.plugin = name.to_string();
                        }
                        rec
                    }));
                }
                Err(e) => {
                    metrics::counter!(
                        "costmesh_plugin_failures_total",
                        "plugin" => name.to_string(),
                        "operation" => Capability::Recommendations.as_str()
                    )
                    .increment(1);
                    tracing::warn!(plugin = name, error = %e, "Recommendation fetch failed");
                    outcome.errors.push(PluginFailure::new(name, &e));
                }
            }
        }

        Ok(outcome)
    }

    /// Start a supervised recommendation fetch alongside other work.
    pub fn spawn_recommendations(
        &self,
        resources: Vec<ResourceDescriptor>,
        options: ExecuteOptions,
    ) -> BackgroundTask<RecommendationOutcome> {
        let engine = self.clone();
        let cancel = options.cancel.clone();
        spawn_supervised("recommendations", cancel, async move {
            engine.recommendations(&resources, &options).await
        })
    }
}
