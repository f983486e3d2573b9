//! Routing configuration

use serde::{Deserialize, Serialize};

/// How a routing pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    #[default]
    Glob,
    Regex,
}

/// Which resource field a pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternField {
    /// Resource type, e.g. `aws:ec2/instance:Instance`
    #[default]
    Type,
    /// Resource ID / URN
    Id,
}

/// A single match pattern of a routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    #[serde(rename = "type", default)]
    pub kind: PatternKind,
    pub pattern: String,
    #[serde(default)]
    pub field: PatternField,
}

impl PatternConfig {
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Glob,
            pattern: pattern.into(),
            field: PatternField::Type,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Regex,
            pattern: pattern.into(),
            field: PatternField::Type,
        }
    }

    pub fn on_id(mut self) -> Self {
        self.field = PatternField::Id;
        self
    }
}

/// Routes matching resources to one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub plugin: String,
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,
    /// Higher priority rules are evaluated first.
    #[serde(default)]
    pub priority: i32,
    /// Capabilities this rule applies to. Empty means all.
    #[serde(default)]
    pub features: Vec<String>,
    /// When set, other matching rules' plugins follow this one as fallbacks.
    #[serde(default)]
    pub fallback: bool,
}

impl RoutingRule {
    pub fn new(plugin: impl Into<String>, patterns: Vec<PatternConfig>) -> Self {
        Self {
            plugin: plugin.into(),
            patterns,
            priority: 0,
            features: Vec::new(),
            fallback: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_features(mut self, features: &[&str]) -> Self {
        self.features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }
}

/// Routing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub rules: Vec<RoutingRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_config_defaults() {
        let config = RoutingConfig::default();
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_routing_rules_parse() {
        let toml = r#"
            [[rules]]
            plugin = "aws-public"
            priority = 10
            features = ["projected_cost"]
            patterns = [
                { type = "glob", pattern = "aws:*" },
                { type = "regex", pattern = "^urn:.*::prod::", field = "id" },
            ]

            [[rules]]
            plugin = "kubecost"
            patterns = [{ pattern = "kubernetes:*" }]
        "#;
        let config: RoutingConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.rules.len(), 2);

        let first = &config.rules[0];
        assert_eq!(first.priority, 10);
        assert_eq!(first.patterns[1].kind, PatternKind::Regex);
        assert_eq!(first.patterns[1].field, PatternField::Id);
        assert!(!first.fallback);

        let second = &config.rules[1];
        assert_eq!(second.priority, 0);
        assert_eq!(second.patterns[0].kind, PatternKind::Glob);
        assert_eq!(second.patterns[0].field, PatternField::Type);
        assert!(second.features.is_empty());
    }

    #[test]
    fn test_pattern_kind_serde() {
        let json = serde_json::to_string(&PatternKind::Regex).unwrap();
        assert_eq!(json, "\"regex\"");
    }
}
