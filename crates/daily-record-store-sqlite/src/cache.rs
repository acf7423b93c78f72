use std::path::Path;

use anyhow::{Context, Result};
use daily_record_core::{CacheKey, CacheStore, DailyRecord};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const CREATE_CACHE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS cache_entries (
  cache_key TEXT PRIMARY KEY,
  record_json TEXT NOT NULL,
  written_at TEXT NOT NULL
);
";

/// On-disk record cache. Degrades to a permanent miss when the file is unusable.
pub struct SqliteCache {
    conn: Option<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open the cache file, falling back to an unavailable cache on any failure.
    #[must_use]
    pub fn open(path: &Path) -> Self {
        match Connection::open(path)
            .with_context(|| format!("failed to open cache database at {}", path.display()))
            .and_then(Self::prepare)
        {
            Ok(conn) => Self { conn: Some(Mutex::new(conn)) },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "record cache unavailable");
                Self::unavailable()
            }
        }
    }

    #[must_use]
    pub fn open_in_memory() -> Self {
        match Connection::open_in_memory()
            .context("failed to open in-memory cache")
            .and_then(Self::prepare)
        {
            Ok(conn) => Self { conn: Some(Mutex::new(conn)) },
            Err(err) => {
                tracing::warn!(error = %err, "record cache unavailable");
                Self::unavailable()
            }
        }
    }

    #[must_use]
    pub fn unavailable() -> Self {
        Self { conn: None }
    }

    fn prepare(conn: Connection) -> Result<Connection> {
        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .context("failed to configure cache pragmas")?;
        conn.execute_batch(CREATE_CACHE_SQL).context("failed to create cache_entries")?;
        Ok(conn)
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    /// Number of stored entries; `0` when unavailable.
    #[must_use]
    pub fn len(&self) -> usize {
        let Some(conn) = &self.conn else {
            return 0;
        };
        conn.lock()
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get::<_, i64>(0))
            .ok()
            .and_then(|count| usize::try_from(count).ok())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let Some(conn) = &self.conn else {
            return 0;
        };
        match conn.lock().execute("DELETE FROM cache_entries", []) {
            Ok(removed) => removed,
            Err(err) => {
                tracing::debug!(error = %err, "failed to clear record cache");
                0
            }
        }
    }

    fn read_raw(conn: &Connection, key: &CacheKey) -> Result<Option<String>> {
        conn.query_row(
            "SELECT record_json FROM cache_entries WHERE cache_key = ?1",
            params![key.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .context("failed to read cache entry")
    }

    fn write_raw(conn: &Connection, key: &CacheKey, record: &DailyRecord) -> Result<()> {
        let record_json = serde_json::to_string(record).context("failed to serialize record")?;
        let written_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("failed to format cache timestamp")?;
        conn.execute(
            "INSERT INTO cache_entries(cache_key, record_json, written_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET
               record_json = excluded.record_json,
               written_at = excluded.written_at",
            params![key.as_str(), record_json, written_at],
        )
        .context("failed to write cache entry")?;
        Ok(())
    }
}

impl CacheStore for SqliteCache {
    fn get(&self, key: &CacheKey) -> Option<DailyRecord> {
        let conn = self.conn.as_ref()?;
        let raw = match Self::read_raw(&conn.lock(), key) {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::debug!(key = %key, error = %err, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<DailyRecord>(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::debug!(key = %key, error = %err, "ignoring corrupt cache entry");
                None
            }
        }
    }

    fn put(&self, key: &CacheKey, record: &DailyRecord) {
        let Some(conn) = &self.conn else {
            return;
        };
        if let Err(err) = Self::write_raw(&conn.lock(), key, record) {
            tracing::debug!(key = %key, error = %err, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daily_record_core::{Region, SOURCE_TAG};

    fn unique_temp_cache_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("daily-record-cache-{}.sqlite3", ulid::Ulid::new()))
    }

    fn fixture_record(text: &str) -> DailyRecord {
        DailyRecord {
            subject: "Gemini\u{2013}Cancer Cusp".to_string(),
            region: Region::Southern,
            day: "2026-10-16".to_string(),
            primary_text: text.to_string(),
            affirmation: "I adapt.".to_string(),
            deeper_insight: String::new(),
            source_tag: SOURCE_TAG.to_string(),
        }
    }

    // Test IDs: TSQLC-001
    #[test]
    fn cache_survives_reopen() {
        let path = unique_temp_cache_path();
        let key =
            CacheKey::new(Some("user-9"), "Gemini\u{2013}Cancer Cusp", Region::Southern, "2026-10-16");
        {
            let cache = SqliteCache::open(&path);
            assert!(cache.is_available());
            cache.put(&key, &fixture_record("first"));
            cache.put(&key, &fixture_record("second"));
        }

        let cache = SqliteCache::open(&path);
        assert_eq!(cache.get(&key), Some(fixture_record("second")));
        assert_eq!(cache.len(), 1);

        let _ = std::fs::remove_file(&path);
    }

    // Test IDs: TSQLC-002
    #[test]
    fn unopenable_path_degrades_to_misses() {
        let path = std::env::temp_dir()
            .join(format!("daily-record-missing-{}", ulid::Ulid::new()))
            .join("nested")
            .join("cache.sqlite3");
        let cache = SqliteCache::open(&path);
        let key = CacheKey::new(None, "Aries", Region::Northern, "2026-10-16");

        assert!(!cache.is_available());
        cache.put(&key, &fixture_record("ignored"));
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.clear(), 0);
    }

    // Test IDs: TSQLC-003
    #[test]
    fn corrupt_entry_reads_as_miss() -> Result<()> {
        let cache = SqliteCache::open_in_memory();
        let key = CacheKey::new(None, "Aries", Region::Northern, "2026-10-16");
        if let Some(conn) = &cache.conn {
            conn.lock().execute(
                "INSERT INTO cache_entries(cache_key, record_json, written_at) VALUES (?1, ?2, ?3)",
                params![key.as_str(), "{\"subject\":", "2026-10-16T00:00:00Z"],
            )?;
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key), None);
        Ok(())
    }

    // Test IDs: TSQLC-004
    #[test]
    fn clear_drops_every_entry() {
        let cache = SqliteCache::open_in_memory();
        for day in ["2026-10-15", "2026-10-16"] {
            let key = CacheKey::new(None, "Aries", Region::Northern, day);
            cache.put(&key, &fixture_record(day));
        }
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }
}
