//! Plugin routing
//!
//! Selects which plugin(s) handle a resource for a given capability. Rules are
//! evaluated by descending priority (ties by declaration order); the first rule
//! whose pattern matches and whose plugin advertises the capability wins. With
//! no match the router falls back to every plugin advertising the capability,
//! so an unconfigured installation still routes automatically.

pub mod error;
pub mod rules;
pub mod validation;

pub use error::RoutingError;
pub use rules::{CompiledPattern, CompiledRule};
pub use validation::{validate_routing_config, ValidationReport};

use crate::config::RoutingConfig;
use crate::plugin::{Capability, PluginSummary, ResourceDescriptor};

/// Where a routing decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// A configured rule matched (index into the configuration)
    Rule(usize),
    /// No rule matched; broadcast to every capable plugin
    Automatic,
}

/// Ordered plugins selected for one resource and capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub plugins: Vec<String>,
    pub source: RouteSource,
}

/// Router selects plugins for each resource
pub struct Router {
    /// Compiled rules sorted by descending priority, then declaration order
    rules: Vec<CompiledRule>,
    /// Available plugins in declaration order
    plugins: Vec<PluginSummary>,
}

impl Router {
    /// Compile the configured rules against the available plugins.
    pub fn new(config: &RoutingConfig, plugins: Vec<PluginSummary>) -> Result<Self, RoutingError> {
        let mut rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| CompiledRule::compile(i, rule))
            .collect::<Result<Vec<_>, _>>()?;

        // Stable sort keeps declaration order among equal priorities.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(Self { rules, plugins })
    }

    /// Router with no rules: every request is routed automatically.
    pub fn automatic(plugins: Vec<PluginSummary>) -> Self {
        Self {
            rules: Vec::new(),
            plugins,
        }
    }

    fn plugin_supports(&self, name: &str, capability: Capability) -> bool {
        self.plugins
            .iter()
            .any(|p| p.name == name && p.supports(capability))
    }

    /// Every plugin advertising `capability`, in declaration order.
    pub fn capable_plugins(&self, capability: Capability) -> Vec<String> {
        self.plugins
            .iter()
            .filter(|p| p.supports(capability))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Ordered plugin names that should handle `resource` for `capability`.
    ///
    /// Empty when no plugin advertises the capability.
    pub fn resolve(&self, resource: &ResourceDescriptor, capability: Capability) -> Vec<String> {
        self.route(resource, capability).plugins
    }

    /// Like [`Router::resolve`], also reporting which rule decided.
    pub fn route(&self, resource: &ResourceDescriptor, capability: Capability) -> Route {
        let mut matching = self.rules.iter().filter(|rule| {
            rule.applies_to(capability)
                && self.plugin_supports(&rule.plugin, capability)
                && rule.matches(resource)
        });

        if let Some(winner) = matching.next() {
            let mut plugins = vec![winner.plugin.clone()];
            if winner.fallback {
                for rule in matching {
                    if !plugins.contains(&rule.plugin) {
                        plugins.push(rule.plugin.clone());
                    }
                }
            }

            tracing::trace!(
                resource = %resource.id,
                capability = %capability,
                rule = winner.index,
                plugins = ?plugins,
                "Routed by rule"
            );
            return Route {
                plugins,
                source: RouteSource::Rule(winner.index),
            };
        }

        let plugins = self.capable_plugins(capability);
        tracing::trace!(
            resource = %resource.id,
            capability = %capability,
            plugins = ?plugins,
            "No rule matched, routing automatically"
        );
        Route {
            plugins,
            source: RouteSource::Automatic,
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::config::{PatternConfig, RoutingRule};
    use proptest::prelude::*;

    fn plugin_names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("plugin-{}", i)).collect()
    }

    proptest! {
        #[test]
        fn prop_exactly_one_matching_rule_returns_its_plugin(
            plugin_count in 1usize..6,
            target in 0usize..6,
            priorities in proptest::collection::vec(-10i32..10, 6),
        ) {
            let names = plugin_names(plugin_count);
            let target = target % plugin_count;
            let summaries: Vec<PluginSummary> = names
                .iter()
                .map(|n| PluginSummary::new(n.clone(), vec![Capability::ProjectedCost]))
                .collect();

            // One rule per plugin, each matching a distinct provider prefix.
            let rules: Vec<RoutingRule> = names
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    RoutingRule::new(n.clone(), vec![PatternConfig::glob(format!("p{}:*", i))])
                        .with_priority(priorities[i])
                })
                .collect();
            let router = Router::new(&RoutingConfig { rules }, summaries).unwrap();

            let resource = ResourceDescriptor::new("r", format!("p{}:svc:Thing", target));
            prop_assert_eq!(
                router.resolve(&resource, Capability::ProjectedCost),
                vec![names[target].clone()]
            );
        }

        #[test]
        fn prop_no_match_returns_every_capable_plugin(
            caps in proptest::collection::vec(any::<bool>(), 1..8),
        ) {
            let summaries: Vec<PluginSummary> = caps
                .iter()
                .enumerate()
                .map(|(i, capable)| {
                    let capabilities = if *capable {
                        vec![Capability::ActualCost]
                    } else {
                        vec![Capability::ProjectedCost]
                    };
                    PluginSummary::new(format!("plugin-{}", i), capabilities)
                })
                .collect();
            let expected: Vec<String> = summaries
                .iter()
                .filter(|s| s.supports(Capability::ActualCost))
                .map(|s| s.name.clone())
                .collect();

            let rules = vec![RoutingRule::new("plugin-0", vec![PatternConfig::glob("never:*")])];
            let router = Router::new(&RoutingConfig { rules }, summaries).unwrap();

            let resource = ResourceDescriptor::new("r", "aws:s3/bucket:Bucket");
            prop_assert_eq!(router.resolve(&resource, Capability::ActualCost), expected);
        }
    }
}
