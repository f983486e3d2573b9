//! Translating exceeded budgets into a process exit status

use super::{BudgetEvaluation, BudgetHealth};
use thiserror::Error;

/// Deliberate request to exit non-zero after output has been rendered.
///
/// Not a computation failure: the evaluation itself succeeded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct BudgetExitSignal {
    pub exit_code: i32,
    pub reason: String,
}

/// Decide whether an evaluation should fail the command.
///
/// Considers Exceeded scopes whose effective `exit_on_threshold` is set. The
/// highest non-zero exit code wins; scopes configured with exit code 0 only
/// warn.
pub fn exit_decision(evaluation: &BudgetEvaluation) -> Result<(), BudgetExitSignal> {
    let eligible: Vec<_> = evaluation
        .scopes
        .iter()
        .filter(|s| s.health == BudgetHealth::Exceeded && s.exit_on_threshold)
        .collect();

    let failing: Vec<_> = eligible.iter().filter(|s| s.exit_code != 0).collect();
    if failing.is_empty() {
        if !eligible.is_empty() {
            tracing::warn!(
                scopes = ?eligible.iter().map(|s| s.label()).collect::<Vec<_>>(),
                "Budget exceeded (exit code 0, not failing)"
            );
        }
        return Ok(());
    }

    let exit_code = failing.iter().map(|s| s.exit_code).max().unwrap_or(1);
    let names: Vec<String> = failing
        .iter()
        .map(|s| format!("{} ({:.1}%)", s.label(), s.percentage))
        .collect();

    Err(BudgetExitSignal {
        exit_code,
        reason: format!("budget exceeded: {}", names.join(", ")),
    })
}
