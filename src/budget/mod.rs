//! Hierarchical budget evaluation
//!
//! Allocates monthly spend from cost results to configured scopes (global,
//! provider, tag, resource type) and rates each scope against its thresholds.

pub mod error;
pub mod exit;
pub mod health;
pub mod scope;

pub use error::BudgetError;
pub use exit::{exit_decision, BudgetExitSignal};
pub use health::{health_for, overall_health, percentage, BudgetHealth, DEFAULT_THRESHOLDS};
pub use scope::{ScopeType, TagSelector};

use crate::config::{BudgetPeriod, BudgetsConfig, ScopedBudgetConfig};
use crate::plugin::{provider_from_type, CostResult, ResourceDescriptor};
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Computed status of one budget scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedBudgetStatus {
    pub scope_type: ScopeType,
    /// Provider name, tag selector or resource type; empty for global.
    pub scope_key: String,
    /// Spend over the budget period.
    pub spend: f64,
    pub budget: f64,
    pub percentage: f64,
    pub health: BudgetHealth,
    pub currency: String,
    pub period: BudgetPeriod,
    #[serde(skip)]
    pub exit_on_threshold: bool,
    #[serde(skip)]
    pub exit_code: i32,
}

impl ScopedBudgetStatus {
    /// `scopeType:scopeKey`, e.g. `provider:aws` or `global:`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.scope_type, self.scope_key)
    }
}

/// Result of evaluating every configured scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetEvaluation {
    pub scopes: Vec<ScopedBudgetStatus>,
    pub overall_health: BudgetHealth,
    /// Labels of every Critical or Exceeded scope.
    pub critical_scopes: Vec<String>,
}

/// A configured scope with its running spend.
struct ScopeAccumulator<'a> {
    scope_type: ScopeType,
    key: String,
    budget: &'a ScopedBudgetConfig,
    currency: String,
    monthly_spend: f64,
}

impl<'a> ScopeAccumulator<'a> {
    fn new(
        scope_type: ScopeType,
        key: impl Into<String>,
        budget: &'a ScopedBudgetConfig,
        default_currency: &str,
    ) -> Self {
        Self {
            scope_type,
            key: key.into(),
            budget,
            currency: budget
                .currency
                .clone()
                .unwrap_or_else(|| default_currency.to_string()),
            monthly_spend: 0.0,
        }
    }

    fn add(&mut self, cost: &CostResult) {
        if !cost.currency.eq_ignore_ascii_case(&self.currency) {
            tracing::warn!(
                scope = %format!("{}:{}", self.scope_type, self.key),
                resource = %cost.resource_id,
                cost_currency = %cost.currency,
                budget_currency = %self.currency,
                "Skipping cost with mismatched currency"
            );
            return;
        }
        self.monthly_spend += cost.monthly;
    }

    fn finish(self, config: &BudgetsConfig) -> ScopedBudgetStatus {
        let spend = self.monthly_spend * self.budget.period.months();
        let percentage = percentage(spend, self.budget.amount);
        ScopedBudgetStatus {
            scope_type: self.scope_type,
            scope_key: self.key,
            spend,
            budget: self.budget.amount,
            percentage,
            health: health_for(percentage, &self.budget.thresholds),
            currency: self.currency,
            period: self.budget.period,
            exit_on_threshold: self
                .budget
                .exit_on_threshold
                .unwrap_or(config.exit_on_threshold),
            exit_code: self.budget.exit_code.unwrap_or(config.exit_code),
        }
    }
}

/// Evaluates spend against an immutable budget configuration.
pub struct BudgetEvaluator {
    config: BudgetsConfig,
    tag_selectors: Vec<TagSelector>,
}

impl BudgetEvaluator {
    pub fn new(config: BudgetsConfig) -> Result<Self, BudgetError> {
        let tag_selectors = config
            .tags
            .iter()
            .map(|t| TagSelector::parse(&t.selector))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            config,
            tag_selectors,
        })
    }

    pub fn config(&self) -> &BudgetsConfig {
        &self.config
    }

    /// Index of the tag budget owning `resource`: highest priority, ties by
    /// declaration order.
    fn tag_scope_for(&self, resource: &ResourceDescriptor) -> Option<usize> {
        let tags = resource.tags();
        if tags.is_empty() {
            return None;
        }
        let matching: Vec<usize> = self
            .tag_selectors
            .iter()
            .enumerate()
            .filter(|(_, selector)| selector.matches(&tags))
            .map(|(i, _)| i)
            .collect();

        // max_by_key keeps the last maximum, so compare on (priority, reverse index).
        let winner = matching
            .iter()
            .copied()
            .max_by_key(|i| (self.config.tags[*i].priority, std::cmp::Reverse(*i)))?;

        if matching.len() > 1 {
            tracing::warn!(
                resource = %resource.id,
                selectors = ?matching.iter().map(|i| self.config.tags[*i].selector.as_str()).collect::<Vec<_>>(),
                chosen = %self.config.tags[winner].selector,
                "Resource matches several tag budgets; allocating to the highest priority"
            );
        }
        Some(winner)
    }

    /// Allocate `costs` to every configured scope.
    ///
    /// `resources` supplies tags and providers that cost results lack. Errored
    /// cost results contribute nothing.
    pub fn evaluate(
        &self,
        costs: &[CostResult],
        resources: &[ResourceDescriptor],
        cancel: &CancellationToken,
    ) -> Result<BudgetEvaluation, BudgetError> {
        let currency = self.config.currency.as_str();
        let by_id: HashMap<&str, &ResourceDescriptor> =
            resources.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut global = self
            .config
            .global
            .as_ref()
            .map(|b| ScopeAccumulator::new(ScopeType::Global, "", b, currency));
        let mut providers: Vec<ScopeAccumulator> = self
            .config
            .providers
            .iter()
            .map(|(k, b)| ScopeAccumulator::new(ScopeType::Provider, k.to_lowercase(), b, currency))
            .collect();
        let mut tags: Vec<ScopeAccumulator> = self
            .config
            .tags
            .iter()
            .map(|t| ScopeAccumulator::new(ScopeType::Tag, t.selector.clone(), &t.budget, currency))
            .collect();
        let mut types: Vec<ScopeAccumulator> = self
            .config
            .types
            .iter()
            .map(|(k, b)| ScopeAccumulator::new(ScopeType::Type, k.clone(), b, currency))
            .collect();

        for cost in costs {
            if cancel.is_cancelled() {
                return Err(BudgetError::Cancelled);
            }
            if cost.is_error() {
                continue;
            }

            let resource = by_id.get(cost.resource_id.as_str()).copied();

            if let Some(scope) = global.as_mut() {
                scope.add(cost);
            }

            let resource_type = if cost.resource_type.is_empty() {
                resource.map(|r| r.resource_type.as_str()).unwrap_or_default()
            } else {
                cost.resource_type.as_str()
            };

            let mut provider = provider_from_type(resource_type);
            if provider.is_empty() {
                provider = resource.map(|r| r.provider_name()).unwrap_or_default();
            }
            if !provider.is_empty() {
                if let Some(scope) = providers.iter_mut().find(|s| s.key == provider) {
                    scope.add(cost);
                }
            }

            if let Some(index) = resource.and_then(|r| self.tag_scope_for(r)) {
                tags[index].add(cost);
            }

            if let Some(scope) = types.iter_mut().find(|s| s.key == resource_type) {
                scope.add(cost);
            }
        }

        let scopes: Vec<ScopedBudgetStatus> = global
            .into_iter()
            .chain(providers)
            .chain(tags)
            .chain(types)
            .map(|s| s.finish(&self.config))
            .collect();

        let overall_health = overall_health(scopes.iter().map(|s| s.health));
        let critical_scopes = scopes
            .iter()
            .filter(|s| s.health.is_critical())
            .map(ScopedBudgetStatus::label)
            .collect();

        tracing::debug!(
            scopes = scopes.len(),
            overall = %overall_health,
            "Budget evaluation complete"
        );

        Ok(BudgetEvaluation {
            scopes,
            overall_health,
            critical_scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagBudgetConfig;
    use serde_json::json;

    fn cost(id: &str, resource_type: &str, monthly: f64) -> CostResult {
        let mut result = CostResult::new(id, monthly);
        result.resource_type = resource_type.to_string();
        result
    }

    fn status<'a>(eval: &'a BudgetEvaluation, label: &str) -> &'a ScopedBudgetStatus {
        eval.scopes
            .iter()
            .find(|s| s.label() == label)
            .unwrap_or_else(|| panic!("missing scope {}", label))
    }

    #[test]
    fn provider_budgets_follow_worked_example() {
        let mut config = BudgetsConfig::default();
        config.providers.insert(
            "aws".to_string(),
            ScopedBudgetConfig::new(100.0).with_thresholds(&[80.0]),
        );
        config
            .providers
            .insert("gcp".to_string(), ScopedBudgetConfig::new(50.0));

        let costs = vec![
            cost("a", "aws:ec2/instance:Instance", 80.0),
            cost("g", "gcp:compute/instance:Instance", 30.0),
        ];
        let eval = BudgetEvaluator::new(config)
            .unwrap()
            .evaluate(&costs, &[], &CancellationToken::new())
            .unwrap();

        let aws = status(&eval, "provider:aws");
        assert_eq!(aws.percentage, 80.0);
        assert_eq!(aws.health, BudgetHealth::Warning);
        let gcp = status(&eval, "provider:gcp");
        assert_eq!(gcp.percentage, 60.0);
        assert_eq!(gcp.health, BudgetHealth::Ok);
        assert_eq!(eval.overall_health, BudgetHealth::Warning);
        assert!(eval.critical_scopes.is_empty());
    }

    #[test]
    fn no_scopes_is_unspecified() {
        let eval = BudgetEvaluator::new(BudgetsConfig::default())
            .unwrap()
            .evaluate(&[cost("a", "aws:s3/bucket:Bucket", 5.0)], &[], &CancellationToken::new())
            .unwrap();
        assert!(eval.scopes.is_empty());
        assert_eq!(eval.overall_health, BudgetHealth::Unspecified);
    }

    #[test]
    fn global_scope_scales_by_period_and_labels_critical() {
        let mut config = BudgetsConfig::default();
        let mut global = ScopedBudgetConfig::new(300.0);
        global.period = BudgetPeriod::Quarterly;
        config.global = Some(global);

        let costs = vec![cost("a", "aws:s3/bucket:Bucket", 100.0)];
        let eval = BudgetEvaluator::new(config)
            .unwrap()
            .evaluate(&costs, &[], &CancellationToken::new())
            .unwrap();

        let global = status(&eval, "global:");
        assert_eq!(global.spend, 300.0);
        assert_eq!(global.health, BudgetHealth::Exceeded);
        assert_eq!(eval.critical_scopes, vec!["global:".to_string()]);
    }

    #[test]
    fn errored_and_foreign_currency_costs_are_skipped() {
        let mut config = BudgetsConfig::default();
        config.global = Some(ScopedBudgetConfig::new(100.0));

        let mut errored = cost("e", "aws:s3/bucket:Bucket", 500.0);
        errored.error = Some("boom".to_string());
        let mut euros = cost("eur", "aws:s3/bucket:Bucket", 500.0);
        euros.currency = "EUR".to_string();

        let eval = BudgetEvaluator::new(config)
            .unwrap()
            .evaluate(
                &[errored, euros, cost("ok", "aws:s3/bucket:Bucket", 10.0)],
                &[],
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(status(&eval, "global:").spend, 10.0);
    }

    #[test]
    fn tag_spend_goes_to_highest_priority_selector() {
        let mut config = BudgetsConfig::default();
        config.tags.push(TagBudgetConfig {
            selector: "team:*".to_string(),
            priority: 1,
            budget: ScopedBudgetConfig::new(100.0),
        });
        config.tags.push(TagBudgetConfig {
            selector: "env:prod".to_string(),
            priority: 10,
            budget: ScopedBudgetConfig::new(100.0),
        });

        let resources = vec![
            ResourceDescriptor::new("web", "aws:ec2/instance:Instance")
                .with_property("tags", json!({"env": "prod", "team": "core"})),
            ResourceDescriptor::new("batch", "aws:ec2/instance:Instance")
                .with_property("tags", json!({"team": "data"})),
        ];
        let costs = vec![
            cost("web", "aws:ec2/instance:Instance", 40.0),
            cost("batch", "aws:ec2/instance:Instance", 15.0),
        ];

        let eval = BudgetEvaluator::new(config)
            .unwrap()
            .evaluate(&costs, &resources, &CancellationToken::new())
            .unwrap();
        assert_eq!(status(&eval, "tag:env:prod").spend, 40.0);
        assert_eq!(status(&eval, "tag:team:*").spend, 15.0);
    }

    #[test]
    fn type_scope_uses_resource_type_from_descriptor_when_missing() {
        let mut config = BudgetsConfig::default();
        config.types.insert(
            "aws:s3/bucket:Bucket".to_string(),
            ScopedBudgetConfig::new(10.0),
        );
        let resources = vec![ResourceDescriptor::new("b", "aws:s3/bucket:Bucket")];

        let eval = BudgetEvaluator::new(config)
            .unwrap()
            .evaluate(&[CostResult::new("b", 9.5)], &resources, &CancellationToken::new())
            .unwrap();
        let bucket = status(&eval, "type:aws:s3/bucket:Bucket");
        assert_eq!(bucket.spend, 9.5);
        assert_eq!(bucket.health, BudgetHealth::Critical);
    }

    #[test]
    fn cancelled_evaluation_returns_cancelled() {
        let mut config = BudgetsConfig::default();
        config.global = Some(ScopedBudgetConfig::new(100.0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = BudgetEvaluator::new(config).unwrap().evaluate(
            &[cost("a", "aws:s3/bucket:Bucket", 1.0)],
            &[],
            &cancel,
        );
        assert_eq!(result, Err(BudgetError::Cancelled));
    }

    #[test]
    fn exit_uses_highest_code_among_eligible_scopes() {
        let mut config = BudgetsConfig::default();
        config.exit_on_threshold = true;
        config.exit_code = 3;
        config.global = Some(ScopedBudgetConfig::new(10.0));
        config.providers.insert(
            "aws".to_string(),
            ScopedBudgetConfig::new(10.0).with_exit(true, 7),
        );
        config.providers.insert(
            "gcp".to_string(),
            ScopedBudgetConfig::new(10.0).with_exit(false, 9),
        );

        let costs = vec![
            cost("a", "aws:s3/bucket:Bucket", 20.0),
            cost("g", "gcp:storage/bucket:Bucket", 20.0),
        ];
        let eval = BudgetEvaluator::new(config)
            .unwrap()
            .evaluate(&costs, &[], &CancellationToken::new())
            .unwrap();

        let signal = exit_decision(&eval).unwrap_err();
        assert_eq!(signal.exit_code, 7);
        assert!(signal.reason.contains("provider:aws"));
        assert!(signal.reason.contains("global:"));
        assert!(!signal.reason.contains("provider:gcp"));
    }

    #[test]
    fn exit_code_zero_only_warns() {
        let mut config = BudgetsConfig::default();
        config.global = Some(ScopedBudgetConfig::new(10.0).with_exit(true, 0));

        let eval = BudgetEvaluator::new(config)
            .unwrap()
            .evaluate(&[cost("a", "aws:s3/bucket:Bucket", 50.0)], &[], &CancellationToken::new())
            .unwrap();
        assert_eq!(eval.overall_health, BudgetHealth::Exceeded);
        assert!(exit_decision(&eval).is_ok());
    }

    #[test]
    fn exit_disabled_by_default() {
        let mut config = BudgetsConfig::default();
        config.global = Some(ScopedBudgetConfig::new(10.0));

        let eval = BudgetEvaluator::new(config)
            .unwrap()
            .evaluate(&[cost("a", "aws:s3/bucket:Bucket", 50.0)], &[], &CancellationToken::new())
            .unwrap();
        assert!(exit_decision(&eval).is_ok());
    }

    #[test]
    fn invalid_tag_selector_fails_construction() {
        let mut config = BudgetsConfig::default();
        config.tags.push(TagBudgetConfig {
            selector: "nocolon".to_string(),
            priority: 0,
            budget: ScopedBudgetConfig::new(1.0),
        });
        assert!(matches!(
            BudgetEvaluator::new(config),
            Err(BudgetError::InvalidSelector(_))
        ));
    }
}
