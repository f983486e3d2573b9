//! Startup validation of routing rules.
//!
//! Runs once per invocation, off the hot path. Errors block startup; warnings
//! are logged and the command proceeds.

use super::rules::{parse_features, CompiledPattern};
use crate::config::RoutingRule;
use crate::plugin::PluginSummary;
use serde::Serialize;
use std::collections::HashMap;

/// Outcome of validating routing rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate `rules` against the plugins available to this invocation.
///
/// Errors: unknown plugin, rule without patterns, invalid pattern, invalid
/// feature. Warnings: the same plugin listed by several rules with an
/// identical pattern, and features a plugin is known not to advertise.
pub fn validate_routing_config(
    rules: &[RoutingRule],
    available: &[PluginSummary],
) -> ValidationReport {
    let mut report = ValidationReport::default();
    let plugins: HashMap<&str, &PluginSummary> =
        available.iter().map(|p| (p.name.as_str(), p)).collect();

    // (plugin, field, kind, pattern) -> first rule index
    let mut seen_patterns: HashMap<(String, String), usize> = HashMap::new();

    for (i, rule) in rules.iter().enumerate() {
        let prefix = format!("routing.rules[{}]", i);

        let plugin = plugins.get(rule.plugin.as_str());
        if plugin.is_none() {
            report
                .errors
                .push(format!("{}: unknown plugin '{}'", prefix, rule.plugin));
        }

        if rule.patterns.is_empty() {
            report
                .errors
                .push(format!("{}: rule for '{}' has no patterns", prefix, rule.plugin));
        }

        for pattern in &rule.patterns {
            if let Err(e) = CompiledPattern::compile(pattern) {
                report.errors.push(format!("{}: {}", prefix, e));
                continue;
            }

            let key = (
                rule.plugin.clone(),
                format!("{:?}/{:?}/{}", pattern.field, pattern.kind, pattern.pattern),
            );
            match seen_patterns.get(&key) {
                Some(first) => report.warnings.push(format!(
                    "{}: plugin '{}' already routed by routing.rules[{}] with overlapping pattern '{}'",
                    prefix, rule.plugin, first, pattern.pattern
                )),
                None => {
                    seen_patterns.insert(key, i);
                }
            }
        }

        match parse_features(rule) {
            Ok(features) => {
                if let Some(plugin) = plugin {
                    if !plugin.capabilities.is_empty() {
                        for feature in features.iter().filter(|f| !plugin.supports(**f)) {
                            report.warnings.push(format!(
                                "{}: plugin '{}' does not advertise feature '{}'",
                                prefix, rule.plugin, feature
                            ));
                        }
                    }
                }
            }
            Err(e) => report.errors.push(format!("{}: {}", prefix, e)),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;
    use crate::plugin::Capability;

    fn available() -> Vec<PluginSummary> {
        vec![
            PluginSummary::new("aws", vec![Capability::ProjectedCost, Capability::Recommendations]),
            PluginSummary::new("kubecost", vec![]),
        ]
    }

    #[test]
    fn valid_rules_produce_empty_report() {
        let rules = vec![
            RoutingRule::new("aws", vec![PatternConfig::glob("aws:*")]),
            RoutingRule::new("kubecost", vec![PatternConfig::regex("^kubernetes:")]),
        ];
        let report = validate_routing_config(&rules, &available());
        assert!(report.is_ok());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn unknown_plugin_is_an_error() {
        let rules = vec![RoutingRule::new("azure", vec![PatternConfig::glob("azure:*")])];
        let report = validate_routing_config(&rules, &available());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("unknown plugin 'azure'"));
    }

    #[test]
    fn invalid_pattern_and_feature_are_errors() {
        let rules = vec![
            RoutingRule::new("aws", vec![PatternConfig::regex("(")]),
            RoutingRule::new("aws", vec![PatternConfig::glob("aws:*")]).with_features(&["teleport"]),
            RoutingRule::new("aws", vec![]),
        ];
        let report = validate_routing_config(&rules, &available());
        assert_eq!(report.errors.len(), 3);
        assert!(report.errors[0].starts_with("routing.rules[0]"));
        assert!(report.errors[1].contains("teleport"));
        assert!(report.errors[2].contains("no patterns"));
    }

    #[test]
    fn duplicate_plugin_with_overlapping_pattern_warns() {
        let rules = vec![
            RoutingRule::new("aws", vec![PatternConfig::glob("aws:*")]),
            RoutingRule::new("aws", vec![PatternConfig::glob("aws:*")]).with_priority(10),
        ];
        let report = validate_routing_config(&rules, &available());
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("routing.rules[0]"));
    }

    #[test]
    fn unadvertised_feature_warns_only_when_capabilities_known() {
        let rules = vec![
            RoutingRule::new("aws", vec![PatternConfig::glob("aws:*")]).with_features(&["actual_cost"]),
            RoutingRule::new("kubecost", vec![PatternConfig::glob("kubernetes:*")])
                .with_features(&["actual_cost"]),
        ];
        let report = validate_routing_config(&rules, &available());
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("'aws'"));
    }
}
