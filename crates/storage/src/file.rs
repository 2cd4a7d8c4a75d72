use agentmesh_core::config::LtmBackendKind;
use agentmesh_core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::backend::{CacheEntry, LtmBackend};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// LTM backend that keeps every entry in memory and mirrors the whole map
/// to a single JSON snapshot after each mutation.
pub struct FileBackend {
    entries: Mutex<BTreeMap<String, FileEntry>>,
    path: PathBuf,
}

impl FileBackend {
    /// Load the snapshot at `path`. A missing or unreadable snapshot starts
    /// empty; the next successful write replaces it.
    pub fn open(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, FileEntry>>(&content) {
                Ok(map) => {
                    debug!(path = %path.display(), entries = map.len(), "Loaded LTM snapshot");
                    map
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt LTM snapshot, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable LTM snapshot, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            entries: Mutex::new(entries),
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, FileEntry>>> {
        self.entries
            .lock()
            .map_err(|e| Error::Storage(format!("Lock error: {}", e)))
    }

    /// Write to a sibling temp file, then rename over the snapshot.
    fn persist(&self, entries: &BTreeMap<String, FileEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, content)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::Storage(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }
}

fn to_entry(key: &str, entry: &FileEntry) -> CacheEntry {
    CacheEntry {
        key: key.to_string(),
        value: entry.value.clone(),
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    }
}

impl LtmBackend for FileBackend {
    fn kind(&self) -> LtmBackendKind {
        LtmBackendKind::File
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.lock()?;
        Ok(entries.get(key).map(|e| to_entry(key, e)))
    }

    fn upsert(&self, key: &str, value: &Value, now: DateTime<Utc>, cutoff: DateTime<Utc>) -> Result<()> {
        let mut entries = self.lock()?;
        let created_at = match entries.get(key) {
            Some(existing) if existing.created_at > cutoff => existing.created_at.min(now),
            _ => now,
        };
        entries.insert(
            key.to_string(),
            FileEntry {
                value: value.clone(),
                created_at,
                updated_at: now,
            },
        );
        self.persist(&entries)
    }

    fn delete_expired(&self, key: &str, cutoff: DateTime<Utc>) -> Result<bool> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.created_at <= cutoff => {
                entries.remove(key);
            }
            _ => return Ok(false),
        }
        self.persist(&entries)?;
        Ok(true)
    }

    fn scan_prefix(&self, prefix: &str, cutoff: DateTime<Utc>) -> Result<Vec<CacheEntry>> {
        let entries = self.lock()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, e)| e.created_at > cutoff)
            .map(|(k, e)| to_entry(k, e))
            .collect())
    }

    fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, e| e.created_at > cutoff);
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn flush(&self) -> Result<()> {
        let entries = self.lock()?;
        self.persist(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ltm.json");
        let now = Utc::now();
        let cutoff = now - Duration::days(30);

        let backend = FileBackend::open(&path);
        backend.upsert("analysis:Building-A", &json!({"kwh": 10}), now, cutoff).unwrap();
        drop(backend);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["analysis:Building-A"]["value"], json!({"kwh": 10}));
        assert!(raw["analysis:Building-A"]["created_at"].is_string());

        let reopened = FileBackend::open(&path);
        let entry = reopened.get("analysis:Building-A").unwrap().unwrap();
        assert_eq!(entry.value, json!({"kwh": 10}));
        assert!(!dir.path().join("ltm.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ltm.json");
        std::fs::write(&path, "{ not json").unwrap();

        let backend = FileBackend::open(&path);
        assert_eq!(backend.len().unwrap(), 0);

        let now = Utc::now();
        backend.upsert("k", &json!(1), now, now - Duration::days(1)).unwrap();
        assert_eq!(FileBackend::open(&path).len().unwrap(), 1);
    }

    #[test]
    fn test_prefix_scan_uses_ordering() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(&dir.path().join("ltm.json"));
        let now = Utc::now();
        let cutoff = now - Duration::days(30);
        for key in ["forecast:x", "analysis:b", "analysis:a", "analysisx"] {
            backend.upsert(key, &json!(key), now, cutoff).unwrap();
        }

        let keys: Vec<String> = backend
            .scan_prefix("analysis:", cutoff)
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["analysis:a", "analysis:b"]);
    }
}
