//! Filtering plugin-reported recommendations through local lifecycle state

use super::DismissalStore;
use crate::plugin::{ActionType, LifecycleStatus, Recommendation};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Recommendations after dismissal state has been applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Active recommendations, plus dismissed/snoozed ones when requested.
    pub recommendations: Vec<Recommendation>,
    /// How many plugin-reported recommendations were hidden.
    pub hidden: usize,
}

/// Apply `store` to freshly reported `recommendations`.
///
/// Dismissed and unexpired snoozed recommendations are removed. With
/// `include_dismissed`, they are kept with their lifecycle status, and records
/// the plugins no longer report are rebuilt from their last snapshot, unless an
/// active recommendation covers the same id or the same resource and action.
pub fn merge_with_store(
    recommendations: Vec<Recommendation>,
    store: &DismissalStore,
    include_dismissed: bool,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let mut reported_ids: HashSet<String> = HashSet::new();
    let mut active_keys: HashSet<(String, ActionType)> = HashSet::new();

    for mut rec in recommendations {
        reported_ids.insert(rec.id.clone());
        let status = store.status_at(&rec.id, now);
        if status == LifecycleStatus::Active {
            active_keys.insert((rec.resource_id.clone(), rec.action_type));
            rec.status = LifecycleStatus::Active;
            outcome.recommendations.push(rec);
            continue;
        }

        outcome.hidden += 1;
        if include_dismissed {
            rec.status = status;
            outcome.recommendations.push(rec);
        }
    }

    if include_dismissed {
        for record in store.records() {
            if reported_ids.contains(&record.recommendation_id) {
                continue;
            }
            let status = record.status_at(now);
            if status == LifecycleStatus::Active {
                continue;
            }
            let Some(snapshot) = &record.snapshot else {
                continue;
            };
            if active_keys.contains(&(snapshot.resource_id.clone(), snapshot.action_type)) {
                tracing::debug!(
                    recommendation = %record.recommendation_id,
                    resource = %snapshot.resource_id,
                    "Skipping stale dismissal superseded by an active recommendation"
                );
                continue;
            }

            let mut rec = snapshot.clone();
            rec.id = record.recommendation_id.clone();
            rec.status = status;
            outcome.recommendations.push(rec);
        }
    }

    outcome
}
