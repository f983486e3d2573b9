//! Dismissal records and their audit history

use crate::plugin::{LifecycleStatus, Recommendation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Why a recommendation was dismissed or snoozed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DismissalReason {
    NotApplicable,
    AlreadyImplemented,
    BusinessConstraint,
    TechnicalConstraint,
    #[default]
    Deferred,
    InaccurateRecommendation,
    Other,
}

impl DismissalReason {
    pub const ALL: [DismissalReason; 7] = [
        DismissalReason::NotApplicable,
        DismissalReason::AlreadyImplemented,
        DismissalReason::BusinessConstraint,
        DismissalReason::TechnicalConstraint,
        DismissalReason::Deferred,
        DismissalReason::InaccurateRecommendation,
        DismissalReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DismissalReason::NotApplicable => "not_applicable",
            DismissalReason::AlreadyImplemented => "already_implemented",
            DismissalReason::BusinessConstraint => "business_constraint",
            DismissalReason::TechnicalConstraint => "technical_constraint",
            DismissalReason::Deferred => "deferred",
            DismissalReason::InaccurateRecommendation => "inaccurate_recommendation",
            DismissalReason::Other => "other",
        }
    }
}

impl fmt::Display for DismissalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DismissalReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|r| r.as_str()).collect();
                format!("Unknown dismissal reason '{}' (expected one of: {})", s, valid.join(", "))
            })
    }
}

/// Lifecycle transition recorded in a record's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Dismissed,
    Snoozed,
    Undismissed,
    /// A snooze ran out and the recommendation became active again.
    Expired,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleAction::Dismissed => "dismissed",
            LifecycleAction::Snoozed => "snoozed",
            LifecycleAction::Undismissed => "undismissed",
            LifecycleAction::Expired => "expired",
        })
    }
}

/// One immutable history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub at: DateTime<Utc>,
    pub action: LifecycleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DismissalReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Local lifecycle state of one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DismissalRecord {
    pub recommendation_id: String,
    pub status: LifecycleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DismissalReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Recommendation as last reported by its plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Recommendation>,
    #[serde(default)]
    pub history: Vec<LifecycleEvent>,
}

impl DismissalRecord {
    pub(crate) fn new(recommendation_id: impl Into<String>) -> Self {
        Self {
            recommendation_id: recommendation_id.into(),
            status: LifecycleStatus::Active,
            reason: None,
            note: None,
            expires_at: None,
            snapshot: None,
            history: Vec::new(),
        }
    }

    /// Status as of `now`: a snooze whose expiry has passed reads as active.
    pub fn status_at(&self, now: DateTime<Utc>) -> LifecycleStatus {
        match (self.status, self.expires_at) {
            (LifecycleStatus::Snoozed, Some(until)) if now > until => LifecycleStatus::Active,
            (status, _) => status,
        }
    }

    /// True while the recommendation is hidden from primary output.
    pub fn is_suppressed_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) != LifecycleStatus::Active
    }

    pub(crate) fn record(
        &mut self,
        at: DateTime<Utc>,
        action: LifecycleAction,
        reason: Option<DismissalReason>,
        note: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.history.push(LifecycleEvent {
            at,
            action,
            reason,
            note,
            expires_at,
        });
    }
}
