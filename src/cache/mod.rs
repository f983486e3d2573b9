//! File-backed result cache
//!
//! One JSON file per entry (`<fingerprint>.json`) under the cache directory.
//! Entries are served only while `now < created_at + ttl`; total size is kept
//! under `max_size_mb` by evicting expired entries, then the oldest. Every IO
//! or parse failure degrades to a miss.

pub mod error;
pub mod fingerprint;

pub use error::CacheError;
pub use fingerprint::fingerprint;

use crate::atomic::write_atomic;
use crate::config::CacheConfig;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

const ENTRY_EXTENSION: &str = "json";

/// A cached payload and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    /// Serialized payload length.
    pub size_bytes: u64,
    pub payload: Value,
}

impl CacheEntry {
    /// `None` when the TTL is too large to represent.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(self.ttl_seconds).ok().and_then(Duration::try_seconds)?;
        self.created_at.checked_add_signed(ttl)
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(true, |expires| now < expires)
    }
}

/// Summary of the on-disk cache for `cache stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub directory: PathBuf,
    pub enabled: bool,
    pub entries: usize,
    pub expired: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Entry metadata gathered while scanning the directory.
#[derive(Debug)]
struct StoredEntry {
    path: PathBuf,
    fingerprint: String,
    created_at: DateTime<Utc>,
    fresh: bool,
    /// On-disk file size.
    file_bytes: u64,
}

/// Content-addressed cache of plugin results.
#[derive(Debug, Clone)]
pub struct Cache {
    directory: PathBuf,
    enabled: bool,
    ttl_seconds: u64,
    max_bytes: u64,
}

impl Cache {
    pub fn new(
        directory: impl Into<PathBuf>,
        enabled: bool,
        ttl_seconds: u64,
        max_size_mb: u64,
    ) -> Self {
        Self {
            directory: directory.into(),
            enabled,
            ttl_seconds,
            max_bytes: max_size_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.resolved_directory(),
            config.enabled,
            config.ttl_seconds,
            config.max_size_mb,
        )
    }

    /// Pass-through cache: every get misses, every put is dropped.
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false, 0, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", fingerprint, ENTRY_EXTENSION))
    }

    /// Cached value for `fingerprint`, if present and fresh.
    pub fn get<T: DeserializeOwned>(&self, fingerprint: &str) -> Option<T> {
        self.get_at(fingerprint, Utc::now())
    }

    /// Like [`Cache::get`], evaluating freshness at `now`.
    pub fn get_at<T: DeserializeOwned>(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let entry = match self.read_entry(fingerprint) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                metrics::counter!("costmesh_cache_misses_total").increment(1);
                return None;
            }
            Err(e) => {
                tracing::debug!(fingerprint, error = %e, "Unreadable cache entry, treating as miss");
                self.remove_quietly(&self.entry_path(fingerprint));
                metrics::counter!("costmesh_cache_misses_total").increment(1);
                return None;
            }
        };

        if !entry.is_fresh_at(now) {
            tracing::debug!(fingerprint, created_at = %entry.created_at, "Cache entry expired");
            metrics::counter!("costmesh_cache_misses_total").increment(1);
            return None;
        }

        match serde_json::from_value(entry.payload) {
            Ok(value) => {
                tracing::debug!(fingerprint, "Cache hit");
                metrics::counter!("costmesh_cache_hits_total").increment(1);
                Some(value)
            }
            Err(e) => {
                tracing::debug!(fingerprint, error = %e, "Cached payload has unexpected shape");
                metrics::counter!("costmesh_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Store `value` under `fingerprint` with the configured TTL.
    pub fn put<T: Serialize>(&self, fingerprint: &str, value: &T) {
        self.put_with_ttl(fingerprint, value, self.ttl_seconds);
    }

    /// Store `value` with an explicit TTL. Failures are logged and ignored.
    pub fn put_with_ttl<T: Serialize>(&self, fingerprint: &str, value: &T, ttl_seconds: u64) {
        self.put_at(fingerprint, value, ttl_seconds, Utc::now());
    }

    pub(crate) fn put_at<T: Serialize>(
        &self,
        fingerprint: &str,
        value: &T,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.try_put(fingerprint, value, ttl_seconds, now) {
            tracing::warn!(fingerprint, error = %e, "Failed to write cache entry");
            return;
        }
        if let Err(e) = self.enforce_size_limit(now) {
            tracing::warn!(error = %e, "Cache eviction failed");
        }
    }

    fn try_put<T: Serialize>(
        &self,
        fingerprint: &str,
        value: &T,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_value(value)?;
        let size_bytes = serde_json::to_vec(&payload)?.len() as u64;
        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            created_at: now,
            ttl_seconds,
            size_bytes,
            payload,
        };

        let path = self.entry_path(fingerprint);
        let bytes = serde_json::to_vec(&entry)?;
        write_atomic(&path, &bytes).map_err(|e| CacheError::io(&path, e))?;

        tracing::debug!(fingerprint, size_bytes, ttl_seconds, "Cached result");
        Ok(())
    }

    fn read_entry(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(fingerprint);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupted {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if entry.fingerprint != fingerprint {
            return Err(CacheError::Corrupted {
                path,
                message: format!("entry records fingerprint {}", entry.fingerprint),
            });
        }
        Ok(Some(entry))
    }

    /// Scan every entry file. Unreadable entries are removed.
    fn scan(&self, now: DateTime<Utc>) -> Result<Vec<StoredEntry>, CacheError> {
        let dir = match std::fs::read_dir(&self.directory) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.directory, e)),
        };

        let mut entries = Vec::new();
        for item in dir {
            let item = item.map_err(|e| CacheError::io(&self.directory, e))?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(fingerprint) = path.file_stem().and_then(|s| s.to_str()).map(String::from)
            else {
                continue;
            };

            match self.read_entry(&fingerprint) {
                Ok(Some(entry)) => {
                    let file_bytes = item.metadata().map(|m| m.len()).unwrap_or(entry.size_bytes);
                    entries.push(StoredEntry {
                        fresh: entry.is_fresh_at(now),
                        created_at: entry.created_at,
                        path,
                        fingerprint,
                        file_bytes,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Removing unreadable cache entry");
                    self.remove_quietly(&path);
                }
            }
        }
        Ok(entries)
    }

    /// Evict until the total fits `max_size_mb`: expired first, then oldest,
    /// ties by larger size, then by fingerprint.
    fn enforce_size_limit(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut entries = self.scan(now)?;
        let mut total: u64 = entries.iter().map(|e| e.file_bytes).sum();
        if total <= self.max_bytes {
            return Ok(0);
        }

        entries.sort_by(|a, b| {
            a.fresh
                .cmp(&b.fresh)
                .then(a.created_at.cmp(&b.created_at))
                .then(b.file_bytes.cmp(&a.file_bytes))
                .then(a.fingerprint.cmp(&b.fingerprint))
        });

        let mut evicted = 0;
        for entry in entries {
            if total <= self.max_bytes {
                break;
            }
            // Counted even when another process got there first: the bytes are gone.
            remove_entry(&entry.path)?;
            total = total.saturating_sub(entry.file_bytes);
            evicted += 1;
            tracing::debug!(fingerprint = %entry.fingerprint, fresh = entry.fresh, "Evicted cache entry");
        }
        metrics::counter!("costmesh_cache_evictions_total").increment(evicted as u64);
        Ok(evicted)
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn prune(&self) -> Result<usize, CacheError> {
        self.prune_at(Utc::now())
    }

    pub(crate) fn prune_at(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut removed = 0;
        for entry in self.scan(now)?.into_iter().filter(|e| !e.fresh) {
            if remove_entry(&entry.path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for entry in self.scan(Utc::now())? {
            if remove_entry(&entry.path)? {
                removed += 1;
            }
        }
        tracing::info!(removed, directory = %self.directory.display(), "Cache cleared");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.scan(Utc::now())?;
        Ok(CacheStats {
            directory: self.directory.clone(),
            enabled: self.enabled,
            entries: entries.len(),
            expired: entries.iter().filter(|e| !e.fresh).count(),
            total_bytes: entries.iter().map(|e| e.file_bytes).sum(),
            max_bytes: self.max_bytes,
            oldest: entries.iter().map(|e| e.created_at).min(),
            newest: entries.iter().map(|e| e.created_at).max(),
        })
    }

    fn remove_quietly(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
    }
}

/// Delete one entry file. `false` when it was already gone, e.g. removed by
/// a concurrent process.
fn remove_entry(path: &Path) -> Result<bool, CacheError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::io(path, e)),
    }
}
