//! Recommendation lifecycle state
//!
//! Persists dismiss/snooze decisions in a versioned JSON document:
//!
//! ```json
//! { "version": 1, "dismissals": { "<recommendation id>": { ... } } }
//! ```
//!
//! Every transition appends to the record's history, which is never pruned.

pub mod error;
pub mod merge;
pub mod types;

pub use error::DismissalError;
pub use merge::{merge_with_store, MergeOutcome};
pub use types::{DismissalReason, DismissalRecord, LifecycleAction, LifecycleEvent};

use crate::atomic::write_atomic;
use crate::plugin::{LifecycleStatus, Recommendation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const STORE_VERSION: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u64,
    #[serde(default)]
    dismissals: BTreeMap<String, DismissalRecord>,
}

/// File-backed dismissal state for one invocation.
#[derive(Debug, Clone)]
pub struct DismissalStore {
    path: PathBuf,
    records: BTreeMap<String, DismissalRecord>,
    /// Digest of the file contents this store last read or wrote. `None`
    /// when the file did not exist.
    baseline: Option<String>,
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl DismissalStore {
    /// Empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            baseline: None,
        }
    }

    /// Load the store at `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DismissalError> {
        let path = path.into();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No dismissal store yet");
                return Ok(Self::new(path));
            }
            Err(e) => return Err(DismissalError::Io { path, source: e }),
        };

        let corrupted = |message: String| DismissalError::Corrupted {
            path: path.clone(),
            message,
        };

        let document: Value = serde_json::from_slice(&bytes).map_err(|e| corrupted(e.to_string()))?;
        let version = document
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| corrupted("missing numeric 'version'".to_string()))?;
        if version != STORE_VERSION {
            return Err(DismissalError::UnsupportedVersion { path, version });
        }

        let file: StoreFile =
            serde_json::from_value(document).map_err(|e| corrupted(e.to_string()))?;
        tracing::debug!(
            path = %path.display(),
            records = file.dismissals.len(),
            "Loaded dismissal store"
        );

        Ok(Self {
            path,
            records: file.dismissals,
            baseline: Some(digest(&bytes)),
        })
    }

    /// Persist with rename-on-write.
    ///
    /// The file on disk must still be the one this store loaded (or last
    /// saved). When another process wrote it in between, nothing is written
    /// and [`DismissalError::ConcurrentModification`] is returned so the
    /// caller can reload and retry instead of discarding the other change.
    /// The check and the rename are not atomic together; two writers racing
    /// inside that window still resolve last-writer-wins.
    pub fn save(&mut self) -> Result<(), DismissalError> {
        let on_disk = match std::fs::read(&self.path) {
            Ok(bytes) => Some(digest(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(DismissalError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        if on_disk != self.baseline {
            tracing::warn!(path = %self.path.display(), "Dismissal store changed since it was loaded");
            return Err(DismissalError::ConcurrentModification {
                path: self.path.clone(),
            });
        }

        let file = StoreFile {
            version: STORE_VERSION,
            dismissals: self.records.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &bytes).map_err(|e| DismissalError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        self.baseline = Some(digest(&bytes));
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &str) -> Option<&DismissalRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &DismissalRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Effective status of `id` at `now` (Active when there is no record).
    pub fn status_at(&self, id: &str, now: DateTime<Utc>) -> LifecycleStatus {
        self.records
            .get(id)
            .map_or(LifecycleStatus::Active, |r| r.status_at(now))
    }

    pub fn history(&self, id: &str) -> Option<&[LifecycleEvent]> {
        self.records.get(id).map(|r| r.history.as_slice())
    }

    /// Dismiss `id`. Allowed from Active or Snoozed.
    pub fn dismiss(
        &mut self,
        id: &str,
        reason: DismissalReason,
        note: Option<String>,
        snapshot: Option<Recommendation>,
        now: DateTime<Utc>,
    ) -> Result<&DismissalRecord, DismissalError> {
        let current = self.status_at(id, now);
        if current == LifecycleStatus::Dismissed {
            return Err(DismissalError::InvalidTransition {
                id: id.to_string(),
                from: current,
                action: "dismiss",
            });
        }

        let record = self
            .records
            .entry(id.to_string())
            .or_insert_with(|| DismissalRecord::new(id));
        record.status = LifecycleStatus::Dismissed;
        record.reason = Some(reason);
        record.note = note.clone();
        record.expires_at = None;
        if snapshot.is_some() {
            record.snapshot = snapshot;
        }
        record.record(now, LifecycleAction::Dismissed, Some(reason), note, None);

        tracing::info!(recommendation = id, reason = %reason, "Recommendation dismissed");
        Ok(record)
    }

    /// Snooze `id` until `until`. Allowed from any state; re-snoozing updates
    /// the expiry in place.
    pub fn snooze(
        &mut self,
        id: &str,
        until: DateTime<Utc>,
        reason: Option<DismissalReason>,
        note: Option<String>,
        snapshot: Option<Recommendation>,
        now: DateTime<Utc>,
    ) -> Result<&DismissalRecord, DismissalError> {
        if until <= now {
            return Err(DismissalError::SnoozeNotInFuture { until });
        }
        let reason = reason.unwrap_or(DismissalReason::Deferred);

        let record = self
            .records
            .entry(id.to_string())
            .or_insert_with(|| DismissalRecord::new(id));
        record.status = LifecycleStatus::Snoozed;
        record.reason = Some(reason);
        record.note = note.clone();
        record.expires_at = Some(until);
        if snapshot.is_some() {
            record.snapshot = snapshot;
        }
        record.record(now, LifecycleAction::Snoozed, Some(reason), note, Some(until));

        tracing::info!(recommendation = id, until = %until, "Recommendation snoozed");
        Ok(record)
    }

    /// Return `id` to Active. Allowed from Dismissed or Snoozed.
    pub fn undismiss(
        &mut self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<&DismissalRecord, DismissalError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| DismissalError::NotFound(id.to_string()))?;

        let current = record.status_at(now);
        if current == LifecycleStatus::Active {
            return Err(DismissalError::InvalidTransition {
                id: id.to_string(),
                from: current,
                action: "undismiss",
            });
        }

        record.status = LifecycleStatus::Active;
        record.reason = None;
        record.note = None;
        record.expires_at = None;
        record.record(now, LifecycleAction::Undismissed, None, None, None);

        tracing::info!(recommendation = id, "Recommendation reactivated");
        Ok(record)
    }

    /// Reactivate every snooze that has run out, appending an `expired` event.
    /// Returns the reactivated ids.
    pub fn reactivate_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut reactivated = Vec::new();
        for (id, record) in self.records.iter_mut() {
            if record.status == LifecycleStatus::Snoozed
                && record.status_at(now) == LifecycleStatus::Active
            {
                let expired_at = record.expires_at;
                let reason = record.reason;
                record.status = LifecycleStatus::Active;
                record.expires_at = None;
                record.record(now, LifecycleAction::Expired, reason, None, expired_at);
                reactivated.push(id.clone());
            }
        }
        if !reactivated.is_empty() {
            tracing::debug!(count = reactivated.len(), "Reactivated expired snoozes");
        }
        reactivated
    }
}
