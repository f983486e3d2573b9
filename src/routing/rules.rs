//! Compiled routing rules

use super::RoutingError;
use crate::config::{PatternConfig, PatternField, PatternKind, RoutingRule};
use crate::plugin::{Capability, ResourceDescriptor};
use globset::{Glob, GlobMatcher};
use regex::Regex;

#[derive(Debug, Clone)]
enum Matcher {
    Glob(GlobMatcher),
    Regex(Regex),
}

/// A pattern compiled once when the router is built.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    matcher: Matcher,
    field: PatternField,
}

impl CompiledPattern {
    pub fn compile(config: &PatternConfig) -> Result<Self, RoutingError> {
        let matcher = match config.kind {
            PatternKind::Glob => Glob::new(&config.pattern)
                .map(|g| Matcher::Glob(g.compile_matcher()))
                .map_err(|e| RoutingError::InvalidPattern {
                    kind: "glob",
                    pattern: config.pattern.clone(),
                    message: e.kind().to_string(),
                })?,
            PatternKind::Regex => Regex::new(&config.pattern)
                .map(Matcher::Regex)
                .map_err(|e| RoutingError::InvalidPattern {
                    kind: "regex",
                    pattern: config.pattern.clone(),
                    message: e.to_string(),
                })?,
        };
        Ok(Self {
            matcher,
            field: config.field,
        })
    }

    pub fn matches(&self, resource: &ResourceDescriptor) -> bool {
        let subject = match self.field {
            PatternField::Type => resource.resource_type.as_str(),
            PatternField::Id => resource.id.as_str(),
        };
        match &self.matcher {
            Matcher::Glob(glob) => glob.is_match(subject),
            Matcher::Regex(regex) => regex.is_match(subject),
        }
    }
}

/// Parse a rule's feature list. Empty means every capability.
pub fn parse_features(rule: &RoutingRule) -> Result<Vec<Capability>, RoutingError> {
    rule.features
        .iter()
        .map(|feature| {
            feature
                .parse::<Capability>()
                .map_err(|_| RoutingError::InvalidFeature {
                    plugin: rule.plugin.clone(),
                    feature: feature.clone(),
                })
        })
        .collect()
}

/// A routing rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub plugin: String,
    pub priority: i32,
    pub fallback: bool,
    /// Position in the configuration (tie-breaker).
    pub index: usize,
    features: Vec<Capability>,
    patterns: Vec<CompiledPattern>,
}

impl CompiledRule {
    pub fn compile(index: usize, rule: &RoutingRule) -> Result<Self, RoutingError> {
        if rule.patterns.is_empty() {
            return Err(RoutingError::EmptyRule {
                plugin: rule.plugin.clone(),
            });
        }
        let patterns = rule
            .patterns
            .iter()
            .map(CompiledPattern::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            plugin: rule.plugin.clone(),
            priority: rule.priority,
            fallback: rule.fallback,
            index,
            features: parse_features(rule)?,
            patterns,
        })
    }

    pub fn applies_to(&self, capability: Capability) -> bool {
        self.features.is_empty() || self.features.contains(&capability)
    }

    /// True if any pattern matches.
    pub fn matches(&self, resource: &ResourceDescriptor) -> bool {
        self.patterns.iter().any(|p| p.matches(resource))
    }
}
