//! Wire and domain types shared between the engine and cost plugins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// An operation a plugin may declare support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ProjectedCost,
    ActualCost,
    Recommendations,
    EstimateCost,
    Dismiss,
}

impl Capability {
    /// Every capability, in protocol order.
    pub const ALL: [Capability; 5] = [
        Capability::ProjectedCost,
        Capability::ActualCost,
        Capability::Recommendations,
        Capability::EstimateCost,
        Capability::Dismiss,
    ];

    /// Snake-case protocol name (also the HTTP operation path segment).
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ProjectedCost => "projected_cost",
            Capability::ActualCost => "actual_cost",
            Capability::Recommendations => "recommendations",
            Capability::EstimateCost => "estimate_cost",
            Capability::Dismiss => "dismiss",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "projectedcost" | "projected" => Ok(Capability::ProjectedCost),
            "actualcost" | "actual" => Ok(Capability::ActualCost),
            "recommendations" | "recommendation" => Ok(Capability::Recommendations),
            "estimatecost" | "estimate" => Ok(Capability::EstimateCost),
            "dismiss" | "dismissrecommendation" => Ok(Capability::Dismiss),
            _ => Err(format!("Unknown capability: {}", s)),
        }
    }
}

/// A single infrastructure resource handed to plugins.
///
/// The `id` is the infra-as-code URN and must be unique within one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let resource_type = resource_type.into();
        Self {
            id: id.into(),
            provider: provider_from_type(&resource_type),
            resource_type,
            region: None,
            properties: Map::new(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Property value when it is a non-empty string.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Provider name, falling back to the resource type prefix.
    pub fn provider_name(&self) -> String {
        if self.provider.is_empty() {
            provider_from_type(&self.resource_type)
        } else {
            self.provider.to_lowercase()
        }
    }

    /// Resource tags from the `tags` property. Non-string values are stringified.
    pub fn tags(&self) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        if let Some(Value::Object(map)) = self.properties.get("tags") {
            for (key, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                tags.insert(key.clone(), value);
            }
        }
        tags
    }

    /// Copy of this resource with `overrides` merged over its properties.
    pub fn with_overrides(&self, overrides: &Map<String, Value>) -> Self {
        let mut modified = self.clone();
        for (key, value) in overrides {
            modified.properties.insert(key.clone(), value.clone());
        }
        modified
    }
}

/// Extract the provider from a resource type such as `aws:ec2/instance:Instance`.
///
/// Returns the lowercased segment before the first `:` or `/`.
pub fn provider_from_type(resource_type: &str) -> String {
    resource_type
        .split([':', '/'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Cost of one resource as reported by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostResult {
    pub resource_id: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub monthly: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CostResult {
    pub fn new(resource_id: impl Into<String>, monthly: f64) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type: String::new(),
            plugin: String::new(),
            monthly,
            total: monthly,
            currency: default_currency(),
            recommendations: Vec::new(),
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn provider_name(&self) -> String {
        provider_from_type(&self.resource_type)
    }
}

pub(crate) fn default_currency() -> String {
    "USD".to_string()
}

/// Kind of change a recommendation proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Rightsize,
    Terminate,
    PurchaseCommitment,
    AdjustRequests,
    Modify,
    DeleteUnused,
    Migrate,
    Consolidate,
    Schedule,
    Refactor,
    #[serde(other)]
    Other,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Rightsize => "rightsize",
            ActionType::Terminate => "terminate",
            ActionType::PurchaseCommitment => "purchase_commitment",
            ActionType::AdjustRequests => "adjust_requests",
            ActionType::Modify => "modify",
            ActionType::DeleteUnused => "delete_unused",
            ActionType::Migrate => "migrate",
            ActionType::Consolidate => "consolidate",
            ActionType::Schedule => "schedule",
            ActionType::Refactor => "refactor",
            ActionType::Other => "other",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "rightsize" | "right_size" => Ok(ActionType::Rightsize),
            "terminate" => Ok(ActionType::Terminate),
            "purchase_commitment" => Ok(ActionType::PurchaseCommitment),
            "adjust_requests" => Ok(ActionType::AdjustRequests),
            "modify" => Ok(ActionType::Modify),
            "delete_unused" => Ok(ActionType::DeleteUnused),
            "migrate" => Ok(ActionType::Migrate),
            "consolidate" => Ok(ActionType::Consolidate),
            "schedule" => Ok(ActionType::Schedule),
            "refactor" => Ok(ActionType::Refactor),
            "other" => Ok(ActionType::Other),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Lifecycle state of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Active,
    Dismissed,
    Snoozed,
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Dismissed => "dismissed",
            LifecycleStatus::Snoozed => "snoozed",
        })
    }
}

/// A cost-saving recommendation reported by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    #[serde(default)]
    pub resource_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub estimated_savings: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub status: LifecycleStatus,
    #[serde(default)]
    pub plugin: String,
}

/// Time window for actual (billed) cost queries, `[from, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
}

impl CostWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            group_by: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.from < self.to
    }
}

/// What-if cost comparison for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateResult {
    pub resource_id: String,
    pub baseline: f64,
    pub modified: f64,
    pub delta: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub plugin: String,
    /// True when computed from two projected-cost calls instead of a native estimate.
    #[serde(default)]
    pub fallback: bool,
}

/// Dismissal forwarded to the plugin that produced a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DismissRequest {
    pub recommendation_id: String,
    pub reason: crate::dismissal::DismissalReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capability_from_str_accepts_common_spellings() {
        assert_eq!("projected_cost".parse::<Capability>(), Ok(Capability::ProjectedCost));
        assert_eq!("ProjectedCost".parse::<Capability>(), Ok(Capability::ProjectedCost));
        assert_eq!("actual-cost".parse::<Capability>(), Ok(Capability::ActualCost));
        assert_eq!("RECOMMENDATIONS".parse::<Capability>(), Ok(Capability::Recommendations));
        assert_eq!("estimate".parse::<Capability>(), Ok(Capability::EstimateCost));
        assert_eq!("dismiss".parse::<Capability>(), Ok(Capability::Dismiss));
        assert!("carbon".parse::<Capability>().is_err());
    }

    #[test]
    fn capability_serde_is_snake_case() {
        let json = serde_json::to_string(&Capability::EstimateCost).unwrap();
        assert_eq!(json, "\"estimate_cost\"");
    }

    #[test]
    fn provider_from_type_extracts_prefix() {
        assert_eq!(provider_from_type("aws:ec2/instance:Instance"), "aws");
        assert_eq!(provider_from_type("gcp/compute.Instance"), "gcp");
        assert_eq!(provider_from_type("Azure-Native:compute:VirtualMachine"), "azure-native");
        assert_eq!(provider_from_type(""), "");
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let resource: ResourceDescriptor = serde_json::from_value(json!({
            "id": "urn:pulumi:dev::app::aws:ec2/instance:Instance::web",
            "type": "aws:ec2/instance:Instance"
        }))
        .unwrap();
        assert_eq!(resource.provider_name(), "aws");
        assert!(resource.properties.is_empty());
        assert!(resource.region.is_none());
    }

    #[test]
    fn descriptor_tags_stringify_values() {
        let resource = ResourceDescriptor::new("r1", "aws:s3/bucket:Bucket")
            .with_property("tags", json!({"env": "prod", "tier": 2}));
        let tags = resource.tags();
        assert_eq!(tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(tags.get("tier").map(String::as_str), Some("2"));
    }

    #[test]
    fn with_overrides_replaces_only_given_keys() {
        let resource = ResourceDescriptor::new("r1", "aws:ec2/instance:Instance")
            .with_property("instanceType", "t3.micro")
            .with_property("ami", "ami-123");
        let mut overrides = Map::new();
        overrides.insert("instanceType".to_string(), json!("m5.large"));

        let modified = resource.with_overrides(&overrides);
        assert_eq!(modified.property_str("instanceType"), Some("m5.large"));
        assert_eq!(modified.property_str("ami"), Some("ami-123"));
        assert_eq!(resource.property_str("instanceType"), Some("t3.micro"));
    }

    #[test]
    fn unknown_action_type_deserializes_as_other() {
        let rec: Recommendation = serde_json::from_value(json!({
            "id": "rec-1",
            "resource_id": "i-123",
            "action_type": "quantum_leap"
        }))
        .unwrap();
        assert_eq!(rec.action_type, ActionType::Other);
        assert_eq!(rec.status, LifecycleStatus::Active);
        assert_eq!(rec.currency, "USD");
    }

    #[test]
    fn cost_window_validity() {
        let now = Utc::now();
        assert!(CostWindow::new(now - chrono::Duration::days(1), now).is_valid());
        assert!(!CostWindow::new(now, now).is_valid());
    }
}
