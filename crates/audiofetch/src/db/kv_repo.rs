//! Key-value repository: expiring entries and ordered lists on top of SQLite.
//!
//! Entries live in `kv_entries`; an entry whose `expires_at` (unix millis)
//! has passed is invisible to [`get`] and is deleted lazily on access, but
//! stays visible to [`scan_prefix`] until [`purge_expired`] runs so that
//! reconciliation can still clean up whatever the entry referenced.
//!
//! Lists live in `kv_lists`; the head of a list is the row with the
//! highest id.

use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// A raw entry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvRow {
    pub key: String,
    pub value: String,
    pub expires_at: Option<i64>,
}

impl KvRow {
    /// Returns true if the row's deadline is at or before `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }
}

/// Current wall clock in unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn deadline_after(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// Returns the value stored at `key`, or `None` if absent or expired.
pub fn get(db: &Database, key: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv_entries WHERE key = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        match row {
            Some((_, Some(expires_at))) if expires_at <= now_millis() => {
                conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    })
}

/// Returns the raw row at `key` whether or not its deadline has passed.
/// Unlike [`get`], an expired row is left in place.
pub fn get_row(db: &Database, key: &str) -> Result<Option<KvRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT key, value, expires_at FROM kv_entries WHERE key = ?1",
                params![key],
                |r| {
                    Ok(KvRow {
                        key: r.get(0)?,
                        value: r.get(1)?,
                        expires_at: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

/// Stores `value` at `key`, replacing any previous value. `ttl` of `None`
/// means the entry never expires.
pub fn set(
    db: &Database,
    key: &str,
    value: &str,
    ttl: Option<Duration>,
) -> Result<(), DatabaseError> {
    set_with_deadline(db, key, value, ttl.map(deadline_after))
}

/// Stores `value` at `key` with an absolute deadline in unix millis.
pub fn set_with_deadline(
    db: &Database,
    key: &str,
    value: &str,
    expires_at: Option<i64>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;
        Ok(())
    })
}

/// Re-arms the expiry of an existing entry. Returns false if the key is absent.
pub fn expire(db: &Database, key: &str, ttl: Duration) -> Result<bool, DatabaseError> {
    let deadline = deadline_after(ttl);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE kv_entries SET expires_at = ?2 WHERE key = ?1",
            params![key, deadline],
        )?;
        Ok(changed > 0)
    })
}

/// Deletes an entry. Returns whether a row was removed.
pub fn delete(db: &Database, key: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(changed > 0)
    })
}

/// Enumerates every entry whose key starts with `prefix`, expired or not.
pub fn scan_prefix(db: &Database, prefix: &str) -> Result<Vec<KvRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT key, value, expires_at FROM kv_entries
             WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let rows = stmt
            .query_map(params![prefix], |r| {
                Ok(KvRow {
                    key: r.get(0)?,
                    value: r.get(1)?,
                    expires_at: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes every entry whose deadline has passed. Returns the number removed.
pub fn purge_expired(db: &Database) -> Result<usize, DatabaseError> {
    let now = now_millis();
    db.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now],
        )?;
        Ok(removed)
    })
}

/// Pushes `value` onto the head of the list at `key`.
pub fn list_push_front(db: &Database, key: &str, value: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO kv_lists (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    })
}

/// Pushes `value` onto the head of the list unless some existing element
/// satisfies `exists`. The scan and the insert happen in one transaction.
/// Returns whether the value was inserted.
pub fn list_push_front_unless<F>(
    db: &Database,
    key: &str,
    value: &str,
    exists: F,
) -> Result<bool, DatabaseError>
where
    F: Fn(&str) -> bool,
{
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let duplicate = {
            let mut stmt = tx.prepare("SELECT value FROM kv_lists WHERE key = ?1")?;
            let values = stmt
                .query_map(params![key], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            values.iter().any(|v| exists(v))
        };

        if duplicate {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO kv_lists (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        tx.commit()?;
        Ok(true)
    })
}

/// Returns list elements head first, skipping `offset` and returning at
/// most `limit` elements (`None` for all).
pub fn list_range(
    db: &Database,
    key: &str,
    offset: usize,
    limit: Option<usize>,
) -> Result<Vec<String>, DatabaseError> {
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    let offset = offset as i64;
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT value FROM kv_lists WHERE key = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let values = stmt
            .query_map(params![key, limit, offset], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    })
}

/// Returns the number of elements in the list at `key`.
pub fn list_len(db: &Database, key: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM kv_lists WHERE key = ?1",
            params![key],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    })
}

/// Removes every element for which `keep` returns false. The read, filter
/// and delete happen in one transaction, so elements pushed concurrently
/// are neither lost nor resurrected. Returns the number removed.
pub fn list_retain<F>(db: &Database, key: &str, keep: F) -> Result<usize, DatabaseError>
where
    F: Fn(&str) -> bool,
{
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let doomed: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id, value FROM kv_lists WHERE key = ?1")?;
            let rows = stmt
                .query_map(params![key], |r| {
                    Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter()
                .filter(|(_, value)| !keep(value))
                .map(|(id, _)| id)
                .collect()
        };

        for id in &doomed {
            tx.execute("DELETE FROM kv_lists WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(doomed.len())
    })
}
