//! Recommendation dismissal
//!
//! The transition is validated against local state first. Dismiss and snooze
//! are then forwarded, best-effort, to the plugin that produced the
//! recommendation, and the store is saved.

use super::{CallGuard, Engine, EngineError, ExecuteOptions};
use crate::dismissal::{DismissalReason, DismissalRecord, DismissalStore};
use crate::plugin::{Capability, DismissRequest, Recommendation};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Requested lifecycle transition.
#[derive(Debug, Clone, PartialEq)]
pub enum DismissAction {
    Dismiss {
        reason: DismissalReason,
        note: Option<String>,
    },
    Snooze {
        until: DateTime<Utc>,
        reason: Option<DismissalReason>,
        note: Option<String>,
    },
    Undismiss,
}

impl DismissAction {
    fn name(&self) -> &'static str {
        match self {
            DismissAction::Dismiss { .. } => "dismiss",
            DismissAction::Snooze { .. } => "snooze",
            DismissAction::Undismiss => "undismiss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DismissOutcome {
    pub record: DismissalRecord,
    /// Plugin the request was forwarded to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarded_to: Option<String>,
    /// Plugin-side failure; the local change was still recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_error: Option<String>,
}

impl Engine {
    /// Apply `action` to recommendation `id` and persist `store`.
    ///
    /// `snapshot` is the recommendation as currently reported, when known; it
    /// identifies the source plugin and is kept for audit output.
    pub async fn dismiss(
        &self,
        store: &mut DismissalStore,
        id: &str,
        action: DismissAction,
        snapshot: Option<Recommendation>,
        options: &ExecuteOptions,
    ) -> Result<DismissOutcome, EngineError> {
        let now = Utc::now();
        let source_plugin = snapshot
            .as_ref()
            .map(|r| r.plugin.clone())
            .or_else(|| {
                store
                    .get(id)
                    .and_then(|r| r.snapshot.as_ref())
                    .map(|s| s.plugin.clone())
            })
            .filter(|p| !p.is_empty());

        let request = match &action {
            DismissAction::Dismiss { reason, note } => {
                store.dismiss(id, *reason, note.clone(), snapshot, now)?;
                Some(DismissRequest {
                    recommendation_id: id.to_string(),
                    reason: *reason,
                    note: note.clone(),
                    expires_at: None,
                })
            }
            DismissAction::Snooze {
                until,
                reason,
                note,
            } => {
                let record = store.snooze(id, *until, *reason, note.clone(), snapshot, now)?;
                Some(DismissRequest {
                    recommendation_id: id.to_string(),
                    reason: record.reason.unwrap_or_default(),
                    note: note.clone(),
                    expires_at: Some(*until),
                })
            }
            DismissAction::Undismiss => {
                store.undismiss(id, now)?;
                None
            }
        };

        let mut forwarded_to = None;
        let mut forward_error = None;
        if let (Some(request), Some(name)) = (request, source_plugin) {
            match self.pool.get(&name) {
                Some(plugin) if plugin.supports(Capability::Dismiss) => {
                    let guard = CallGuard::new(options);
                    if let Err(e) = guard.run(plugin.dismiss_recommendation(&request)).await {
                        tracing::warn!(
                            plugin = %name,
                            recommendation = id,
                            error = %e,
                            "Plugin rejected dismissal; keeping local state"
                        );
                        forward_error = Some(e.to_string());
                    }
                    forwarded_to = Some(name);
                }
                _ => {
                    tracing::debug!(plugin = %name, recommendation = id, "Source plugin does not accept dismissals");
                }
            }
        }

        store.save()?;
        let record = store
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::RecommendationNotFound(id.to_string()))?;
        tracing::debug!(recommendation = id, action = action.name(), "Lifecycle transition saved");

        Ok(DismissOutcome {
            record,
            forwarded_to,
            forward_error,
        })
    }
}
