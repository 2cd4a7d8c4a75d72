use agentmesh_core::config::LtmBackendKind;
use agentmesh_core::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{format_ts, parse_ts, CacheEntry, LtmBackend};

fn storage_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{}: {}", context, e))
}

/// Transactional LTM backend on a single SQLite table.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| storage_err("Failed to create db directory", e))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| storage_err("Failed to open ltm db", e))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS ltm_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ltm_created_at ON ltm_entries(created_at);
            ",
        )
        .map_err(|e| storage_err("Failed to init ltm schema", e))?;

        debug!(path = %db_path.display(), "SQLite LTM schema initialized");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| storage_err("Lock error", e))
    }
}

fn row_to_entry(key: String, value: String, created_at: String, updated_at: String) -> Result<CacheEntry> {
    let value: Value = serde_json::from_str(&value)?;
    let created_at = parse_ts(&created_at)
        .ok_or_else(|| Error::Storage(format!("Bad created_at for {}: {}", key, created_at)))?;
    let updated_at = parse_ts(&updated_at).unwrap_or(created_at);
    Ok(CacheEntry {
        key,
        value,
        created_at,
        updated_at,
    })
}

impl LtmBackend for SqliteBackend {
    fn kind(&self) -> LtmBackendKind {
        LtmBackendKind::Sqlite
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT value, created_at, updated_at FROM ltm_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| storage_err("Query error", e))?;

        match row {
            Some((value, created_at, updated_at)) => {
                row_to_entry(key.to_string(), value, created_at, updated_at).map(Some)
            }
            None => Ok(None),
        }
    }

    fn upsert(&self, key: &str, value: &Value, now: DateTime<Utc>, cutoff: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        let payload = serde_json::to_string(value)?;
        let now = format_ts(now);

        // created_at keeps the earliest value unless that value has already
        // expired, in which case the write starts a fresh lifetime.
        conn.execute(
            "INSERT INTO ltm_entries (key, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at,
                created_at = CASE
                    WHEN ltm_entries.created_at <= ?4 THEN excluded.created_at
                    ELSE MIN(ltm_entries.created_at, excluded.created_at)
                END",
            params![key, payload, now, format_ts(cutoff)],
        )
        .map_err(|e| storage_err("Upsert error", e))?;
        Ok(())
    }

    fn delete_expired(&self, key: &str, cutoff: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "DELETE FROM ltm_entries WHERE key = ?1 AND created_at <= ?2",
                params![key, format_ts(cutoff)],
            )
            .map_err(|e| storage_err("Delete error", e))?;
        Ok(affected > 0)
    }

    fn scan_prefix(&self, prefix: &str, cutoff: DateTime<Utc>) -> Result<Vec<CacheEntry>> {
        let conn = self.lock()?;
        // substr keeps the match literal and case-sensitive, unlike LIKE.
        let mut stmt = conn
            .prepare(
                "SELECT key, value, created_at, updated_at FROM ltm_entries
                 WHERE substr(key, 1, length(?1)) = ?1 AND created_at > ?2
                 ORDER BY key",
            )
            .map_err(|e| storage_err("Prepare error", e))?;

        let rows = stmt
            .query_map(params![prefix, format_ts(cutoff)], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(|e| storage_err("Query error", e))?;

        let mut entries = Vec::new();
        for row in rows {
            let (key, value, created_at, updated_at) = row.map_err(|e| storage_err("Row error", e))?;
            match row_to_entry(key, value, created_at, updated_at) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "Skipping unreadable LTM row"),
            }
        }
        Ok(entries)
    }

    fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM ltm_entries WHERE created_at <= ?1",
            params![format_ts(cutoff)],
        )
        .map_err(|e| storage_err("Compact error", e))
    }

    fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ltm_entries", [], |row| row.get(0))
            .map_err(|e| storage_err("Count error", e))?;
        Ok(count as usize)
    }

    fn flush(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| storage_err("Checkpoint error", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_backend() -> (SqliteBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = SqliteBackend::open(&dir.path().join("ltm.db")).unwrap();
        (backend, dir)
    }

    #[test]
    fn test_upsert_keeps_created_at() {
        let (backend, _dir) = test_backend();
        let t0 = Utc::now();
        let cutoff = t0 - Duration::days(30);

        backend.upsert("k", &json!({"v": 1}), t0, cutoff).unwrap();
        let t1 = t0 + Duration::hours(2);
        backend.upsert("k", &json!({"v": 2}), t1, cutoff).unwrap();

        let entry = backend.get("k").unwrap().unwrap();
        assert_eq!(entry.value, json!({"v": 2}));
        assert_eq!(format_ts(entry.created_at), format_ts(t0));
        assert_eq!(format_ts(entry.updated_at), format_ts(t1));
    }

    #[test]
    fn test_prefix_is_literal_and_case_sensitive() {
        let (backend, _dir) = test_backend();
        let now = Utc::now();
        let cutoff = now - Duration::days(1);
        for key in ["a_b:1", "axb:2", "A_B:3"] {
            backend.upsert(key, &json!(key), now, cutoff).unwrap();
        }

        let keys: Vec<String> = backend
            .scan_prefix("a_b", cutoff)
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["a_b:1".to_string()]);
    }

    #[test]
    fn test_purge_counts_rows() {
        let (backend, _dir) = test_backend();
        let now = Utc::now();
        let old = now - Duration::days(40);
        backend.upsert("old", &json!(1), old, old - Duration::days(30)).unwrap();
        backend.upsert("new", &json!(2), now, now - Duration::days(30)).unwrap();

        assert_eq!(backend.purge_expired(now - Duration::days(30)).unwrap(), 1);
        assert_eq!(backend.len().unwrap(), 1);
        assert_eq!(backend.purge_expired(now - Duration::days(30)).unwrap(), 0);
    }
}
