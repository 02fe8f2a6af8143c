//! Deduplicated, most-recent-first ledger of served artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{kv_repo, Database, DatabaseError};
use crate::format::AudioFormat;

const HISTORY_KEY: &str = "history";

/// User-facing record of a served artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub url: String,
    pub artifact_name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub identifier: String,
    pub format: AudioFormat,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn same_artifact(&self, identifier: &str, format: AudioFormat) -> bool {
        self.identifier == identifier && self.format == format
    }
}

/// Ledger stored as one list in the key-value store. Every mutation runs
/// as a single transaction, so appends and removals never interleave.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    db: Database,
}

impl HistoryLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts `entry` at the head unless an entry for the same
    /// `(identifier, format)` already exists. Returns whether it was added.
    pub fn append(&self, entry: &HistoryEntry) -> Result<bool, DatabaseError> {
        let value = serde_json::to_string(entry).map_err(|e| DatabaseError::Codec {
            key: HISTORY_KEY.to_string(),
            source: e,
        })?;

        let added = kv_repo::list_push_front_unless(&self.db, HISTORY_KEY, &value, |raw| {
            decode(raw).is_some_and(|existing| {
                existing.same_artifact(&entry.identifier, entry.format)
            })
        })?;

        if added {
            log::debug!("History: recorded {}", entry.artifact_name);
        }
        Ok(added)
    }

    /// All entries, most recent first.
    pub fn list(&self) -> Result<Vec<HistoryEntry>, DatabaseError> {
        let raw = kv_repo::list_range(&self.db, HISTORY_KEY, 0, None)?;
        Ok(raw.iter().filter_map(|r| decode(r)).collect())
    }

    /// Removes every entry referencing `artifact_name`. Returns the count.
    pub fn remove_by_artifact_name(&self, artifact_name: &str) -> Result<usize, DatabaseError> {
        let removed = kv_repo::list_retain(&self.db, HISTORY_KEY, |raw| {
            decode(raw).map_or(true, |entry| entry.artifact_name != artifact_name)
        })?;
        if removed > 0 {
            log::debug!("History: removed {} entries for {}", removed, artifact_name);
        }
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize, DatabaseError> {
        kv_repo::list_len(&self.db, HISTORY_KEY)
    }

    pub fn is_empty(&self) -> Result<bool, DatabaseError> {
        Ok(self.len()? == 0)
    }
}

fn decode(raw: &str) -> Option<HistoryEntry> {
    match serde_json::from_str(raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            log::warn!("Skipping undecodable history entry: {}", e);
            None
        }
    }
}
