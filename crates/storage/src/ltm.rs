//! Long-term memory: a TTL-bounded key/value store for memoized task
//! results.
//!
//! [`Ltm`] owns one [`LtmBackend`] and applies expiry on top of it. Backend
//! faults never reach callers: they are logged and surface as a failed
//! write, a miss, an empty listing or a zero count.

use agentmesh_core::config::{LtmBackendKind, LtmConfig};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{CacheEntry, LtmBackend};
use crate::file::FileBackend;
use crate::sqlite::SqliteBackend;

/// Source of "now" for expiry decisions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// An unexpired entry as reported by [`Ltm::query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtmRecord {
    pub key: String,
    pub value: Value,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CacheEntry> for LtmRecord {
    fn from(entry: CacheEntry) -> Self {
        Self {
            key: entry.key,
            value: entry.value,
            created_at: entry.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            updated_at: entry.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtmStats {
    pub backend: LtmBackendKind,
    pub path: String,
    pub entries: usize,
    pub ttl_days: u32,
}

pub struct Ltm {
    backend: Box<dyn LtmBackend>,
    path: PathBuf,
    ttl_days: u32,
    clock: Clock,
    closed: AtomicBool,
}

impl Ltm {
    /// Open the configured backend at `path`. A SQLite backend that fails
    /// to initialize is replaced by the snapshot backend at the same path
    /// with a `.json` extension.
    pub fn open(config: &LtmConfig, path: &Path) -> Self {
        let (backend, path): (Box<dyn LtmBackend>, PathBuf) = match config.backend {
            LtmBackendKind::Sqlite => match SqliteBackend::open(path) {
                Ok(backend) => (Box::new(backend), path.to_path_buf()),
                Err(e) => {
                    let fallback = path.with_extension("json");
                    warn!(
                        path = %path.display(),
                        fallback = %fallback.display(),
                        error = %e,
                        "SQLite LTM unavailable, falling back to file backend"
                    );
                    (Box::new(FileBackend::open(&fallback)), fallback)
                }
            },
            LtmBackendKind::File => (Box::new(FileBackend::open(path)), path.to_path_buf()),
        };

        info!(
            backend = backend.kind().as_str(),
            path = %path.display(),
            ttl_days = config.ttl_days,
            "LTM opened"
        );

        Self::with_backend(backend, path, config.ttl_days)
    }

    pub fn with_backend(backend: Box<dyn LtmBackend>, path: PathBuf, ttl_days: u32) -> Self {
        Self {
            backend,
            path,
            ttl_days,
            clock: system_clock(),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the clock used for expiry decisions.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn backend_kind(&self) -> LtmBackendKind {
        self.backend.kind()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.ttl_days))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Store `value` under `key`. Returns `false` if the backend rejected it.
    pub fn write(&self, key: &str, value: &Value) -> bool {
        if self.is_closed() {
            debug!(key, "LTM closed, dropping write");
            return false;
        }
        let now = self.now();
        match self.backend.upsert(key, value, now, self.cutoff(now)) {
            Ok(()) => {
                debug!(key, "LTM write");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "LTM write failed");
                false
            }
        }
    }

    /// Fetch an unexpired value. Expired entries are deleted on sight.
    pub fn read(&self, key: &str) -> Option<Value> {
        if self.is_closed() {
            return None;
        }
        let entry = match self.backend.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "LTM read failed");
                return None;
            }
        };

        let cutoff = self.cutoff(self.now());
        if entry.created_at <= cutoff {
            debug!(key, created_at = %entry.created_at, "LTM entry expired");
            if let Err(e) = self.backend.delete_expired(key, cutoff) {
                warn!(key, error = %e, "Failed to delete expired LTM entry");
            }
            return None;
        }
        Some(entry.value)
    }

    /// Unexpired entries whose key starts with `prefix`, ordered by key.
    pub fn query(&self, prefix: &str) -> Vec<LtmRecord> {
        if self.is_closed() {
            return Vec::new();
        }
        let now = self.now();
        match self.backend.scan_prefix(prefix, self.cutoff(now)) {
            Ok(entries) => entries.into_iter().map(LtmRecord::from).collect(),
            Err(e) => {
                warn!(prefix, error = %e, "LTM query failed");
                Vec::new()
            }
        }
    }

    /// Physically remove every expired entry.
    pub fn compact(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        let now = self.now();
        match self.backend.purge_expired(self.cutoff(now)) {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, backend = self.backend.kind().as_str(), "LTM compacted");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "LTM compaction failed");
                0
            }
        }
    }

    pub fn stats(&self) -> LtmStats {
        let entries = self.backend.len().unwrap_or_else(|e| {
            warn!(error = %e, "LTM count failed");
            0
        });
        LtmStats {
            backend: self.backend.kind(),
            path: self.path.display().to_string(),
            entries,
            ttl_days: self.ttl_days,
        }
    }

    /// Flush pending state. Later operations behave as misses.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.backend.flush() {
            warn!(error = %e, "LTM flush on close failed");
        }
        debug!(path = %self.path.display(), "LTM closed");
    }
}
