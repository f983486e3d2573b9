//! Spend-versus-budget health

use serde::{Deserialize, Serialize};
use std::fmt;

/// Thresholds used when a budget configures none.
pub const DEFAULT_THRESHOLDS: [f64; 2] = [80.0, 90.0];

/// Health of one scope, ordered from best to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum BudgetHealth {
    /// No scope was evaluated.
    #[default]
    Unspecified,
    Ok,
    Warning,
    Critical,
    Exceeded,
}

impl BudgetHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetHealth::Unspecified => "unspecified",
            BudgetHealth::Ok => "ok",
            BudgetHealth::Warning => "warning",
            BudgetHealth::Critical => "critical",
            BudgetHealth::Exceeded => "exceeded",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, BudgetHealth::Critical | BudgetHealth::Exceeded)
    }
}

impl fmt::Display for BudgetHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage of `amount` consumed by `spend`.
///
/// A zero budget is 0% when nothing was spent and fully consumed otherwise.
pub fn percentage(spend: f64, amount: f64) -> f64 {
    if amount > 0.0 {
        spend / amount * 100.0
    } else if spend > 0.0 {
        100.0
    } else {
        0.0
    }
}

/// Health for a percentage against alert thresholds (inclusive).
///
/// At or above 100% is always Exceeded. Otherwise one crossed threshold is a
/// Warning and two or more are Critical.
pub fn health_for(percentage: f64, thresholds: &[f64]) -> BudgetHealth {
    if percentage >= 100.0 {
        return BudgetHealth::Exceeded;
    }
    let thresholds = if thresholds.is_empty() {
        &DEFAULT_THRESHOLDS[..]
    } else {
        thresholds
    };
    match thresholds.iter().filter(|t| percentage >= **t).count() {
        0 => BudgetHealth::Ok,
        1 => BudgetHealth::Warning,
        _ => BudgetHealth::Critical,
    }
}

/// Worst health across `healths`; Unspecified when empty.
pub fn overall_health(healths: impl IntoIterator<Item = BudgetHealth>) -> BudgetHealth {
    healths.into_iter().max().unwrap_or(BudgetHealth::Unspecified)
}
