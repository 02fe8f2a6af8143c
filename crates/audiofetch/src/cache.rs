//! Artifact cache keyed by `(identifier, format)` with a sliding TTL.
//!
//! Every hit refreshes `last_accessed` and re-arms the store-level expiry,
//! so content that keeps getting requested survives while idle content ages
//! out. A record is only trusted while its artifact file exists; a record
//! whose file has vanished is purged on the next lookup.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{kv_repo, Database, DatabaseError};
use crate::format::AudioFormat;
use crate::storage::{ArtifactName, ArtifactStorage};

/// Key prefix shared by every cache record.
pub const CACHE_KEY_PREFIX: &str = "cache:";

fn cache_key(identifier: &str, format: AudioFormat) -> String {
    format!("{}{}:{}", CACHE_KEY_PREFIX, identifier, format)
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Canonical record of a previously produced artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub identifier: String,
    pub format: AudioFormat,
    pub artifact_name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub cached_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn artifact(&self) -> ArtifactName {
        ArtifactName::new(self.identifier.clone(), self.format)
    }

    /// Milliseconds since the entry was last served.
    pub fn idle_millis(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_accessed).num_milliseconds()
    }

    /// Returns true once the entry has been idle longer than `ttl`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.idle_millis(now) > millis(ttl)
    }
}

/// Read-only view of one cache record for operational visibility.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInspection {
    pub identifier: String,
    pub format: AudioFormat,
    pub title: String,
    pub artifact_name: String,
    pub artifact_exists: bool,
    pub age_secs: i64,
    pub remaining_ttl_secs: i64,
    pub last_accessed: DateTime<Utc>,
}

/// Cache records persisted in the key-value store.
#[derive(Debug, Clone)]
pub struct CacheStore {
    db: Database,
    storage: ArtifactStorage,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(db: Database, storage: ArtifactStorage, ttl: Duration) -> Self {
        Self { db, storage, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn storage(&self) -> &ArtifactStorage {
        &self.storage
    }

    /// Returns the entry for `(identifier, format)` and marks it accessed.
    ///
    /// Returns `None` when there is no record or when the record's artifact
    /// file is missing; in the latter case the record is deleted.
    pub fn lookup(
        &self,
        identifier: &str,
        format: AudioFormat,
    ) -> Result<Option<CacheEntry>, DatabaseError> {
        let key = cache_key(identifier, format);
        let Some(mut entry) = self.read(&key)? else {
            return Ok(None);
        };

        if !self.storage.exists(&entry.artifact()) {
            log::warn!(
                "Cache record {} has no artifact on disk, dropping it",
                entry.artifact_name
            );
            kv_repo::delete(&self.db, &key)?;
            return Ok(None);
        }

        entry.last_accessed = Utc::now();
        self.put(&entry)?;
        Ok(Some(entry))
    }

    /// Reads the current record without marking it accessed. Records past
    /// their store-level expiry are still returned so callers can judge
    /// staleness themselves.
    pub fn peek(
        &self,
        identifier: &str,
        format: AudioFormat,
    ) -> Result<Option<CacheEntry>, DatabaseError> {
        let key = cache_key(identifier, format);
        let Some(row) = kv_repo::get_row(&self.db, &key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheEntry>(&row.value) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                log::warn!("Ignoring undecodable cache record {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Creates or overwrites the record with `cached_at = last_accessed = now`.
    pub fn insert(
        &self,
        identifier: &str,
        format: AudioFormat,
        title: &str,
        thumbnail: Option<&str>,
    ) -> Result<CacheEntry, DatabaseError> {
        let now = Utc::now();
        let entry = CacheEntry {
            identifier: identifier.to_string(),
            format,
            artifact_name: ArtifactName::new(identifier, format).file_name(),
            title: title.to_string(),
            thumbnail: thumbnail.map(str::to_string),
            cached_at: now,
            last_accessed: now,
        };
        self.put(&entry)?;
        log::debug!("Cached {}", entry.artifact_name);
        Ok(entry)
    }

    /// Writes `entry` as-is, arming its expiry at `last_accessed + ttl`.
    pub fn put(&self, entry: &CacheEntry) -> Result<(), DatabaseError> {
        let key = cache_key(&entry.identifier, entry.format);
        let value = serde_json::to_string(entry).map_err(|e| DatabaseError::Codec {
            key: key.clone(),
            source: e,
        })?;
        let deadline = entry
            .last_accessed
            .timestamp_millis()
            .saturating_add(millis(self.ttl));
        kv_repo::set_with_deadline(&self.db, &key, &value, Some(deadline))
    }

    /// Removes the record unconditionally. Returns whether one existed.
    pub fn evict(&self, identifier: &str, format: AudioFormat) -> Result<bool, DatabaseError> {
        kv_repo::delete(&self.db, &cache_key(identifier, format))
    }

    /// Rewrites the descriptive metadata of an existing record without
    /// touching its access time.
    pub fn refresh_metadata(
        &self,
        identifier: &str,
        format: AudioFormat,
        title: &str,
        thumbnail: Option<&str>,
    ) -> Result<Option<CacheEntry>, DatabaseError> {
        let key = cache_key(identifier, format);
        let Some(mut entry) = self.read(&key)? else {
            return Ok(None);
        };
        entry.title = title.to_string();
        entry.thumbnail = thumbnail.map(str::to_string);
        self.put(&entry)?;
        Ok(Some(entry))
    }

    /// Every stored record, including ones whose store-level expiry has
    /// passed but which have not been purged yet. Undecodable records are
    /// deleted.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, DatabaseError> {
        let rows = kv_repo::scan_prefix(&self.db, CACHE_KEY_PREFIX)?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<CacheEntry>(&row.value) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    log::warn!("Dropping undecodable cache record {}: {}", row.key, e);
                    kv_repo::delete(&self.db, &row.key)?;
                }
            }
        }
        Ok(entries)
    }

    /// Drops every store row whose expiry has passed. Returns the count.
    pub fn purge_expired(&self) -> Result<usize, DatabaseError> {
        kv_repo::purge_expired(&self.db)
    }

    /// Read-only snapshot of the cache for operators.
    pub fn inspect(&self) -> Result<Vec<CacheInspection>, DatabaseError> {
        let now = Utc::now();
        let ttl_ms = millis(self.ttl);
        let mut view: Vec<CacheInspection> = self
            .entries()?
            .into_iter()
            .map(|entry| {
                let idle = entry.idle_millis(now);
                CacheInspection {
                    artifact_exists: self.storage.exists(&entry.artifact()),
                    age_secs: (now - entry.cached_at).num_seconds(),
                    remaining_ttl_secs: (ttl_ms.saturating_sub(idle) / 1000).max(0),
                    identifier: entry.identifier,
                    format: entry.format,
                    title: entry.title,
                    artifact_name: entry.artifact_name,
                    last_accessed: entry.last_accessed,
                }
            })
            .collect();
        view.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        Ok(view)
    }

    fn read(&self, key: &str) -> Result<Option<CacheEntry>, DatabaseError> {
        let Some(raw) = kv_repo::get(&self.db, key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                log::warn!("Dropping undecodable cache record {}: {}", key, e);
                kv_repo::delete(&self.db, key)?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(ttl: Duration) -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let storage = ArtifactStorage::new(dir.path());
        let db = Database::open_in_memory().unwrap();
        (dir, CacheStore::new(db, storage, ttl))
    }

    fn touch_artifact(store: &CacheStore, identifier: &str, format: AudioFormat) {
        let path = store.storage().path_for(&ArtifactName::new(identifier, format));
        std::fs::write(path, b"audio").unwrap();
    }

    #[test]
    fn test_lookup_miss() {
        let (_dir, store) = setup(Duration::from_secs(3600));
        assert!(store.lookup("abc12345678", AudioFormat::Mp3).unwrap().is_none());
    }

    #[test]
    fn test_insert_then_lookup_refreshes_access_time() {
        let (_dir, store) = setup(Duration::from_secs(3600));
        touch_artifact(&store, "abc12345678", AudioFormat::Mp3);

        let inserted = store
            .insert("abc12345678", AudioFormat::Mp3, "Song", Some("https://img/x.jpg"))
            .unwrap();
        assert_eq!(inserted.artifact_name, "abc12345678.mp3");
        assert_eq!(inserted.cached_at, inserted.last_accessed);

        std::thread::sleep(Duration::from_millis(5));
        let hit = store.lookup("abc12345678", AudioFormat::Mp3).unwrap().unwrap();
        assert_eq!(hit.cached_at, inserted.cached_at);
        assert!(hit.last_accessed > inserted.last_accessed);
        assert_eq!(hit.title, "Song");
        assert_eq!(hit.thumbnail.as_deref(), Some("https://img/x.jpg"));
    }

    #[test]
    fn test_formats_are_cached_separately() {
        let (_dir, store) = setup(Duration::from_secs(3600));
        touch_artifact(&store, "abc12345678", AudioFormat::Mp3);
        store.insert("abc12345678", AudioFormat::Mp3, "Song", None).unwrap();

        assert!(store.lookup("abc12345678", AudioFormat::Wav).unwrap().is_none());
    }

    #[test]
    fn test_lookup_heals_record_without_artifact() {
        let (_dir, store) = setup(Duration::from_secs(3600));
        store.insert("abc12345678", AudioFormat::Mp3, "Song", None).unwrap();

        assert!(store.lookup("abc12345678", AudioFormat::Mp3).unwrap().is_none());
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_evict_is_idempotent() {
        let (_dir, store) = setup(Duration::from_secs(3600));
        store.insert("abc12345678", AudioFormat::Mp3, "Song", None).unwrap();
        assert!(store.evict("abc12345678", AudioFormat::Mp3).unwrap());
        assert!(!store.evict("abc12345678", AudioFormat::Mp3).unwrap());
    }

    #[test]
    fn test_expired_record_is_absent_but_still_enumerated() {
        let (_dir, store) = setup(Duration::from_secs(60));
        touch_artifact(&store, "abc12345678", AudioFormat::Mp3);
        let mut entry = store.insert("abc12345678", AudioFormat::Mp3, "Song", None).unwrap();
        entry.last_accessed = Utc::now() - chrono::Duration::minutes(5);
        store.put(&entry).unwrap();

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_stale(Utc::now(), store.ttl()));

        assert!(store.lookup("abc12345678", AudioFormat::Mp3).unwrap().is_none());
    }

    #[test]
    fn test_refresh_metadata_keeps_access_time() {
        let (_dir, store) = setup(Duration::from_secs(3600));
        let entry = store.insert("abc12345678", AudioFormat::Mp3, "Unknown Title", None).unwrap();

        let updated = store
            .refresh_metadata("abc12345678", AudioFormat::Mp3, "Real Title", Some("t.jpg"))
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Real Title");
        assert_eq!(updated.last_accessed, entry.last_accessed);
        assert!(store
            .refresh_metadata("zzz12345678", AudioFormat::Mp3, "x", None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_inspect_reports_remaining_ttl() {
        let (_dir, store) = setup(Duration::from_secs(3600));
        touch_artifact(&store, "abc12345678", AudioFormat::Mp3);
        store.insert("abc12345678", AudioFormat::Mp3, "Song", None).unwrap();
        store.insert("def12345678", AudioFormat::Wav, "Other", None).unwrap();

        let view = store.inspect().unwrap();
        assert_eq!(view.len(), 2);
        let mp3 = view.iter().find(|v| v.format == AudioFormat::Mp3).unwrap();
        assert!(mp3.artifact_exists);
        assert!(mp3.remaining_ttl_secs > 3500 && mp3.remaining_ttl_secs <= 3600);
        let wav = view.iter().find(|v| v.format == AudioFormat::Wav).unwrap();
        assert!(!wav.artifact_exists);
    }
}
