//! HTTP binding of the cost plugin protocol.
//!
//! Talks to an already-running plugin that exposes JSON endpoints at
//! `POST {url}/v1/{operation}` and `GET {url}/v1/capabilities`.

use super::{
    Capability, CostPlugin, CostResult, CostWindow, DismissRequest, EstimateResult, PluginError,
    Recommendation, ResourceDescriptor,
};
use crate::config::PluginConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Plugin client speaking JSON over HTTP.
pub struct HttpPluginClient {
    /// Configured plugin name
    name: String,
    /// Base URL (e.g., "http://127.0.0.1:7311")
    base_url: String,
    /// Advertised capabilities
    capabilities: Vec<Capability>,
    /// Per-call timeout
    timeout: Duration,
    /// Shared HTTP client for connection pooling
    client: Arc<Client>,
}

#[derive(Serialize)]
struct ResourcesRequest<'a> {
    resources: &'a [ResourceDescriptor],
}

#[derive(Serialize)]
struct ActualCostRequest<'a> {
    resources: &'a [ResourceDescriptor],
    window: &'a CostWindow,
}

#[derive(Serialize)]
struct EstimateRequest<'a> {
    resource: &'a ResourceDescriptor,
    overrides: &'a Map<String, Value>,
}

#[derive(Deserialize)]
struct CostResponse {
    results: Vec<CostResult>,
}

#[derive(Deserialize)]
struct RecommendationsResponse {
    recommendations: Vec<Recommendation>,
}

#[derive(Deserialize)]
struct CapabilitiesResponse {
    capabilities: Vec<String>,
}

impl HttpPluginClient {
    pub fn new(
        name: String,
        base_url: String,
        capabilities: Vec<Capability>,
        timeout: Duration,
        client: Arc<Client>,
    ) -> Self {
        Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            capabilities,
            timeout,
            client,
        }
    }

    /// Build a client from configuration, probing capabilities when the
    /// configuration does not list them.
    pub async fn connect(config: &PluginConfig, client: Arc<Client>) -> Result<Self, PluginError> {
        if config.url.is_empty() {
            return Err(PluginError::Configuration(format!(
                "plugin '{}' has no url",
                config.name
            )));
        }

        let mut plugin = Self::new(
            config.name.clone(),
            config.url.clone(),
            config.capabilities.clone(),
            Duration::from_secs(config.timeout_secs),
            client,
        );

        if plugin.capabilities.is_empty() {
            plugin.capabilities = plugin.fetch_capabilities().await?;
            tracing::debug!(
                plugin = %plugin.name,
                capabilities = ?plugin.capabilities,
                "Probed plugin capabilities"
            );
        }

        Ok(plugin)
    }

    /// Ask the plugin which operations it implements. Unknown names are ignored.
    pub async fn fetch_capabilities(&self) -> Result<Vec<Capability>, PluginError> {
        let url = format!("{}/v1/capabilities", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let body: CapabilitiesResponse = self.read_json(response).await?;
        let mut capabilities = Vec::new();
        for name in body.capabilities {
            match name.parse::<Capability>() {
                Ok(capability) if !capabilities.contains(&capability) => {
                    capabilities.push(capability)
                }
                Ok(_) => {}
                Err(_) => {
                    tracing::debug!(plugin = %self.name, capability = %name, "Ignoring unknown capability");
                }
            }
        }
        Ok(capabilities)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> PluginError {
        if e.is_timeout() {
            PluginError::Timeout(self.timeout.as_millis() as u64)
        } else {
            PluginError::Network(e.to_string())
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, PluginError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PluginError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| {
            PluginError::InvalidResponse(format!("Failed to read response body: {}", e))
        })?;

        serde_json::from_str(&body)
            .map_err(|e| PluginError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        capability: Capability,
        body: &B,
    ) -> Result<T, PluginError> {
        if !self.supports(capability) {
            return Err(PluginError::Unsupported(capability));
        }

        let url = format!("{}/v1/{}", self.base_url, capability.as_str());
        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        self.read_json(response).await
    }
}

#[async_trait]
impl CostPlugin for HttpPluginClient {
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
        let response: CostResponse = self
            .call(Capability::ProjectedCost, &ResourcesRequest { resources })
            .await?;
        Ok(response.results)
    }

    async fn actual_cost(
        &self,
        resources: &[ResourceDescriptor],
        window: &CostWindow,
    ) -> Result<Vec<CostResult>, PluginError> {
        let response: CostResponse = self
            .call(
                Capability::ActualCost,
                &ActualCostRequest { resources, window },
            )
            .await?;
        Ok(response.results)
    }

    async fn recommendations(
        &self,
        resources: &[ResourceDescriptor],
    ) -> Result<Vec<Recommendation>, PluginError> {
        let response: RecommendationsResponse = self
            .call(Capability::Recommendations, &ResourcesRequest { resources })
            .await?;
        Ok(response.recommendations)
    }

    async fn estimate_cost(
        &self,
        resource: &ResourceDescriptor,
        overrides: &Map<String, Value>,
    ) -> Result<EstimateResult, PluginError> {
        self.call(
            Capability::EstimateCost,
            &EstimateRequest {
                resource,
                overrides,
            },
        )
        .await
    }

    async fn dismiss_recommendation(&self, request: &DismissRequest) -> Result<(), PluginError> {
        let _: Value = self.call(Capability::Dismiss, request).await?;
        Ok(())
    }
}
