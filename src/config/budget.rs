//! Budget configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Period a budget amount covers. Monthly spend is scaled to the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl BudgetPeriod {
    /// Number of months in the period.
    pub fn months(&self) -> f64 {
        match self {
            BudgetPeriod::Monthly => 1.0,
            BudgetPeriod::Quarterly => 3.0,
            BudgetPeriod::Yearly => 12.0,
        }
    }
}

/// Budget for one scope (global, a provider, a tag selector or a resource type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedBudgetConfig {
    pub amount: f64,
    /// Inherits `BudgetsConfig::currency` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub period: BudgetPeriod,
    /// Alert thresholds in percent of the amount.
    #[serde(default)]
    pub thresholds: Vec<f64>,
    /// Inherits `BudgetsConfig::exit_on_threshold` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_on_threshold: Option<bool>,
    /// Inherits `BudgetsConfig::exit_code` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ScopedBudgetConfig {
    pub fn new(amount: f64) -> Self {
        Self {
            amount,
            currency: None,
            period: BudgetPeriod::Monthly,
            thresholds: Vec::new(),
            exit_on_threshold: None,
            exit_code: None,
        }
    }

    pub fn with_thresholds(mut self, thresholds: &[f64]) -> Self {
        self.thresholds = thresholds.to_vec();
        self
    }

    pub fn with_exit(mut self, exit_on_threshold: bool, exit_code: i32) -> Self {
        self.exit_on_threshold = Some(exit_on_threshold);
        self.exit_code = Some(exit_code);
        self
    }
}

/// Budget applied to resources whose tags match `selector` (`key:value`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagBudgetConfig {
    pub selector: String,
    /// Highest priority wins when several selectors match one resource.
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub budget: ScopedBudgetConfig,
}

/// Hierarchical budget configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetsConfig {
    pub currency: String,
    pub exit_on_threshold: bool,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<ScopedBudgetConfig>,
    pub providers: BTreeMap<String, ScopedBudgetConfig>,
    pub tags: Vec<TagBudgetConfig>,
    pub types: BTreeMap<String, ScopedBudgetConfig>,
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            exit_on_threshold: false,
            exit_code: 1,
            global: None,
            providers: BTreeMap::new(),
            tags: Vec::new(),
            types: BTreeMap::new(),
        }
    }
}

impl BudgetsConfig {
    pub fn is_empty(&self) -> bool {
        self.global.is_none()
            && self.providers.is_empty()
            && self.tags.is_empty()
            && self.types.is_empty()
    }

    /// Validate every scope, returning one message per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.currency.trim().is_empty() {
            errors.push("budgets.currency cannot be empty".to_string());
        }
        if self.exit_code < 0 || self.exit_code > 255 {
            errors.push(format!(
                "budgets.exit_code must be 0-255, got {}",
                self.exit_code
            ));
        }

        if let Some(global) = &self.global {
            validate_scope("budgets.global", global, &mut errors);
        }
        for (provider, budget) in &self.providers {
            if provider.trim().is_empty() {
                errors.push("budgets.providers has an empty provider name".to_string());
            }
            validate_scope(&format!("budgets.providers.{}", provider), budget, &mut errors);
        }
        for (i, tag) in self.tags.iter().enumerate() {
            let field = format!("budgets.tags[{}]", i);
            if let Err(e) = crate::budget::TagSelector::parse(&tag.selector) {
                errors.push(format!("{}.selector: {}", field, e));
            }
            validate_scope(&field, &tag.budget, &mut errors);
        }
        for (resource_type, budget) in &self.types {
            if resource_type.trim().is_empty() {
                errors.push("budgets.types has an empty resource type".to_string());
            }
            validate_scope(&format!("budgets.types.{}", resource_type), budget, &mut errors);
        }

        errors
    }
}

fn validate_scope(field: &str, budget: &ScopedBudgetConfig, errors: &mut Vec<String>) {
    if !budget.amount.is_finite() || budget.amount < 0.0 {
        errors.push(format!("{}.amount must be >= 0, got {}", field, budget.amount));
    }
    if let Some(currency) = &budget.currency {
        if currency.trim().is_empty() {
            errors.push(format!("{}.currency cannot be empty", field));
        }
    }
    for threshold in &budget.thresholds {
        if !threshold.is_finite() || *threshold <= 0.0 || *threshold > 1000.0 {
            errors.push(format!(
                "{}.thresholds: {} is outside (0, 1000]",
                field, threshold
            ));
        }
    }
    if let Some(code) = budget.exit_code {
        if !(0..=255).contains(&code) {
            errors.push(format!("{}.exit_code must be 0-255, got {}", field, code));
        }
    }
}
