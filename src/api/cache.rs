//! SQLite-backed response cache with per-entry TTL.
//!
//! Entries are keyed by request fingerprint. A row that is expired, missing or
//! unreadable is a miss; the caller can always fall through to a live request.

use crate::error::{KildeError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS responses (
        fingerprint TEXT PRIMARY KEY,
        endpoint TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL,
        ttl_ms INTEGER NOT NULL
    );
"#;

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub size_bytes: u64,
    pub path: Option<PathBuf>,
}

/// Persistent cache of upstream API responses.
pub struct ResponseCache {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    default_ttl: Duration,
}

impl ResponseCache {
    /// Open (or create) the cache database and drop expired rows.
    #[instrument(skip_all)]
    pub fn open(path: &Path, default_ttl: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        let cache = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            default_ttl,
        };

        let purged = cache.purge(true)?;
        info!("Opened response cache at {:?} ({} expired entries purged)", path, purged);

        Ok(cache)
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory(default_ttl: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            default_ttl,
        })
    }

    /// TTL applied by callers that do not pick their own.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| KildeError::CorruptState {
            location: "response cache".to_string(),
            reason: format!("Failed to acquire lock: {}", e),
        })
    }

    /// Return the cached payload if present and not expired.
    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        self.get_at(fingerprint, Utc::now())
    }

    /// Like [`get`](Self::get), evaluated at a given instant.
    pub fn get_at(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<Value> {
        match self.lookup(fingerprint, now) {
            Ok(found) => found,
            Err(e) => {
                warn!("Cache entry {} unreadable, treating as miss: {}", fingerprint, e);
                None
            }
        }
    }

    fn lookup(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<Option<Value>> {
        let conn = self.lock()?;

        let row: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT payload, created_at_ms, ttl_ms FROM responses WHERE fingerprint = ?1",
                params![fingerprint],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((payload, created_at_ms, ttl_ms)) = row else {
            debug!("Cache miss for {}", fingerprint);
            return Ok(None);
        };

        if !is_valid(created_at_ms, ttl_ms, now.timestamp_millis()) {
            debug!("Cache entry {} expired", fingerprint);
            return Ok(None);
        }

        let value = serde_json::from_str(&payload).map_err(|e| KildeError::CorruptState {
            location: format!("cache entry {}", fingerprint),
            reason: e.to_string(),
        })?;

        debug!("Cache hit for {}", fingerprint);
        Ok(Some(value))
    }

    /// Store a payload, replacing any existing entry for the fingerprint.
    pub fn put(&self, fingerprint: &str, endpoint: &str, payload: &Value, ttl: Duration) -> Result<()> {
        self.put_at(fingerprint, endpoint, payload, ttl, Utc::now())
    }

    /// Like [`put`](Self::put), with an explicit creation time.
    pub fn put_at(
        &self,
        fingerprint: &str,
        endpoint: &str,
        payload: &Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_string(payload)?;
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO responses (fingerprint, endpoint, payload, created_at_ms, ttl_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![fingerprint, endpoint, payload, now.timestamp_millis(), ttl_ms],
        )?;

        Ok(())
    }

    /// Remove expired entries, or everything when `expired_only` is false.
    pub fn purge(&self, expired_only: bool) -> Result<usize> {
        self.purge_at(expired_only, Utc::now())
    }

    pub fn purge_at(&self, expired_only: bool, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let removed = if expired_only {
            conn.execute(
                "DELETE FROM responses WHERE ?1 - created_at_ms >= ttl_ms",
                params![now.timestamp_millis()],
            )?
        } else {
            conn.execute("DELETE FROM responses", [])?
        };
        Ok(removed)
    }

    /// Count valid and expired entries.
    pub fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock()?;

        let mut stmt = conn.prepare("SELECT created_at_ms, ttl_ms FROM responses")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;

        let mut stats = CacheStats {
            path: self.path.clone(),
            ..Default::default()
        };

        for row in rows {
            let (created_at_ms, ttl_ms) = row?;
            stats.total_entries += 1;
            if is_valid(created_at_ms, ttl_ms, now) {
                stats.valid_entries += 1;
            } else {
                stats.expired_entries += 1;
            }
        }

        stats.size_bytes = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(stats)
    }
}

/// An entry is valid iff `now - created < ttl`.
fn is_valid(created_at_ms: i64, ttl_ms: i64, now_ms: i64) -> bool {
    now_ms.saturating_sub(created_at_ms) < ttl_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_then_get_within_ttl() {
        let cache = ResponseCache::in_memory(Duration::from_secs(3600)).unwrap();
        let payload = json!({"result": [{"id": "v1"}], "totalresultcount": 1});

        cache.put("fp1", "getsearchsubtitles", &payload, Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("fp1"), Some(payload));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_expired_entry_is_miss() {
        let cache = ResponseCache::in_memory(Duration::from_secs(3600)).unwrap();
        let created = Utc::now();
        cache
            .put_at("fp1", "getvideos", &json!({"id": "v1"}), Duration::from_secs(60), created)
            .unwrap();

        assert!(cache.get_at("fp1", created + chrono::Duration::seconds(59)).is_some());
        assert!(cache.get_at("fp1", created + chrono::Duration::seconds(60)).is_none());

        cache.put("fp2", "getvideos", &json!({}), Duration::ZERO).unwrap();
        assert!(cache.get("fp2").is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = ResponseCache::in_memory(Duration::from_secs(3600)).unwrap();
        cache.put("fp", "e", &json!(1), Duration::from_secs(60)).unwrap();
        cache.put("fp", "e", &json!(2), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("fp"), Some(json!(2)));
        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn test_corrupt_payload_is_miss() {
        let cache = ResponseCache::in_memory(Duration::from_secs(3600)).unwrap();
        {
            let conn = cache.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO responses VALUES ('bad', 'e', '{not json', ?1, 60000)",
                params![Utc::now().timestamp_millis()],
            )
            .unwrap();
        }
        assert!(cache.get("bad").is_none());
    }

    #[test]
    fn test_purge_expired_only() {
        let cache = ResponseCache::in_memory(Duration::from_secs(3600)).unwrap();
        let now = Utc::now();
        cache.put_at("old", "e", &json!(1), Duration::from_secs(10), now - chrono::Duration::seconds(20)).unwrap();
        cache.put_at("new", "e", &json!(2), Duration::from_secs(10), now).unwrap();

        assert_eq!(cache.purge_at(true, now).unwrap(), 1);
        assert!(cache.get_at("new", now).is_some());

        assert_eq!(cache.purge(false).unwrap(), 1);
        assert_eq!(cache.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let cache = ResponseCache::open(&path, Duration::from_secs(3600)).unwrap();
            cache.put("fp", "e", &json!({"ok": true}), Duration::from_secs(3600)).unwrap();
        }

        let cache = ResponseCache::open(&path, Duration::from_secs(3600)).unwrap();
        assert_eq!(cache.get("fp"), Some(json!({"ok": true})));
        let stats = cache.stats().unwrap();
        assert_eq!(stats.valid_entries, 1);
        assert!(stats.size_bytes > 0);
    }
}
