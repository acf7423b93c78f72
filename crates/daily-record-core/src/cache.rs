use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{CacheKey, CacheStore, DailyRecord};

/// Process-local cache holding serialized records. Entries never expire.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an already-serialized entry verbatim.
    pub fn insert_raw(&self, key: &CacheKey, value: impl Into<String>) {
        self.entries.lock().insert(key.as_str().to_string(), value.into());
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<DailyRecord> {
        let raw = self.entries.lock().get(key.as_str()).cloned()?;
        match serde_json::from_str::<DailyRecord>(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::debug!(key = %key, error = %err, "ignoring corrupt cache entry");
                None
            }
        }
    }

    fn put(&self, key: &CacheKey, record: &DailyRecord) {
        match serde_json::to_string(record) {
            Ok(raw) => {
                self.entries.lock().insert(key.as_str().to_string(), raw);
            }
            Err(err) => tracing::debug!(key = %key, error = %err, "skipping cache write"),
        }
    }
}

/// Cache for contexts with no storage medium: every read misses, writes vanish.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CacheStore for NoCache {
    fn get(&self, _key: &CacheKey) -> Option<DailyRecord> {
        None
    }

    fn put(&self, _key: &CacheKey, _record: &DailyRecord) {}
}
