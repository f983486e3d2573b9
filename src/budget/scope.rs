//! Budget scopes and tag selectors

use super::BudgetError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a budget is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Global,
    Provider,
    Tag,
    Type,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Global => "global",
            ScopeType::Provider => "provider",
            ScopeType::Tag => "tag",
            ScopeType::Type => "type",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `key:value` match against resource tags. A value of `*` matches any value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSelector {
    pub key: String,
    pub value: String,
}

impl TagSelector {
    pub fn parse(selector: &str) -> Result<Self, BudgetError> {
        let invalid = || BudgetError::InvalidSelector(selector.to_string());
        let (key, value) = selector.split_once(':').ok_or_else(invalid)?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.get(&self.key)
            .is_some_and(|v| self.value == "*" || *v == self.value)
    }
}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}
