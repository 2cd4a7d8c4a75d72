use agentmesh_core::config::LtmBackendKind;
use agentmesh_core::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One memoized result as held by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage contract shared by the SQLite and snapshot-file backends.
///
/// Backends know nothing about TTLs beyond the cutoff timestamps handed to
/// them: an entry whose `created_at` is at or before `cutoff` is expired.
pub trait LtmBackend: Send + Sync {
    fn kind(&self) -> LtmBackendKind;

    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or update `key`. An existing, unexpired entry keeps its
    /// original `created_at`; an expired one is replaced wholesale.
    fn upsert(&self, key: &str, value: &Value, now: DateTime<Utc>, cutoff: DateTime<Utc>) -> Result<()>;

    /// Remove `key` only if it is still expired under `cutoff`. The check
    /// and the removal happen under one lock, so an entry rewritten in
    /// between survives.
    fn delete_expired(&self, key: &str, cutoff: DateTime<Utc>) -> Result<bool>;

    /// Unexpired entries whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &str, cutoff: DateTime<Utc>) -> Result<Vec<CacheEntry>>;

    /// Physically remove every expired entry, returning how many went.
    fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    fn len(&self) -> Result<usize>;

    fn flush(&self) -> Result<()>;
}

/// Fixed-width RFC 3339 so stored timestamps compare lexicographically.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
