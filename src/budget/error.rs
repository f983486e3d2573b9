//! Error types for budget evaluation

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BudgetError {
    #[error("Invalid tag selector '{0}': expected key:value")]
    InvalidSelector(String),

    #[error("Budget evaluation cancelled")]
    Cancelled,
}
