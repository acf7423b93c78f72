use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use daily_record_core::{
    labels_equivalent, to_canonical_region, CacheKey, CacheStore, Clock, DailyRecord, DayAnchors,
    MemoryCache, RawRow, Region, RowSource, SubjectAttempts, SystemClock,
};
use daily_record_remote::{RemoteConfig, RestRowSource};
use daily_record_store_sqlite::SqliteCache;
use serde::{Deserialize, Serialize};
use time::UtcOffset;

mod profile;

pub use profile::{DailyView, SubjectProfile};

pub const CACHE_PATH_ENV: &str = "DAILY_RECORD_CACHE_PATH";
pub const CACHE_ENABLED_ENV: &str = "DAILY_RECORD_CACHE_ENABLED";
pub const DEBUG_ENV: &str = "DAILY_RECORD_DEBUG";

/// Size of the recency window read when no day anchor matched.
pub const DEFAULT_RECENT_LIMIT: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Namespaces cache entries per requester; anonymous when absent.
    pub requester_id: Option<String>,
    /// Forces a single day anchor, bypassing all clock logic.
    pub override_day: Option<String>,
    pub cache_enabled: bool,
    /// Lets individual components of a compound subject satisfy the match.
    pub allow_component_fallback: bool,
    /// The caller's resolved timezone offset; the clock's local offset otherwise.
    pub utc_offset: Option<UtcOffset>,
    pub debug: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            requester_id: None,
            override_day: None,
            cache_enabled: true,
            allow_component_fallback: false,
            utc_offset: None,
            debug: false,
        }
    }
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|value| value.trim().to_ascii_lowercase())
        .map_or(default, |value| matches!(value.as_str(), "1" | "true" | "yes" | "on"))
}

impl ResolveOptions {
    /// Defaults with the cache and debug flags read from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            cache_enabled: parse_bool(lookup(CACHE_ENABLED_ENV), true),
            debug: parse_bool(lookup(DEBUG_ENV), false),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    Cache,
    RemoteDay,
    RemoteRecent,
}

impl ResolutionStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::RemoteDay => "remote_day",
            Self::RemoteRecent => "remote_recent",
        }
    }
}

/// A resolved record plus where it came from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Resolution {
    pub record: DailyRecord,
    pub stage: ResolutionStage,
    pub matched_subject: String,
    /// Day anchor that produced the match; `None` for the recency fallback.
    pub anchor: Option<String>,
}

pub struct DailyRecordResolver<S, C, K = SystemClock> {
    source: S,
    cache: C,
    clock: K,
    recent_limit: usize,
}

impl<S: RowSource, C: CacheStore> DailyRecordResolver<S, C, SystemClock> {
    #[must_use]
    pub fn new(source: S, cache: C) -> Self {
        Self { source, cache, clock: SystemClock, recent_limit: DEFAULT_RECENT_LIMIT }
    }
}

impl<S: RowSource, C: CacheStore, K: Clock> DailyRecordResolver<S, C, K> {
    #[must_use]
    pub fn with_clock<K2: Clock>(self, clock: K2) -> DailyRecordResolver<S, C, K2> {
        DailyRecordResolver {
            source: self.source,
            cache: self.cache,
            clock,
            recent_limit: self.recent_limit,
        }
    }

    #[must_use]
    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Resolve the daily record for a subject label and region.
    ///
    /// `None` means no record exists for the tuple yet; remote and cache failures
    /// never surface here.
    pub fn resolve(
        &self,
        raw_subject: &str,
        raw_region: Option<&str>,
        options: &ResolveOptions,
    ) -> Option<DailyRecord> {
        self.resolve_detailed(raw_subject, raw_region, options).map(|resolution| resolution.record)
    }

    /// Staged lookup: cache, then date-scoped rows per anchor, then the recency window.
    pub fn resolve_detailed(
        &self,
        raw_subject: &str,
        raw_region: Option<&str>,
        options: &ResolveOptions,
    ) -> Option<Resolution> {
        let attempts = SubjectAttempts::build(raw_subject, options.allow_component_fallback);
        if attempts.is_empty() {
            if options.debug {
                tracing::debug!(raw_subject, "blank subject label; nothing to resolve");
            }
            return None;
        }

        let region = to_canonical_region(raw_region);
        let anchors = DayAnchors::from_clock(
            &self.clock,
            options.utc_offset,
            options.override_day.as_deref(),
        );
        if options.debug {
            tracing::debug!(
                attempts = ?attempts.as_slice(),
                anchors = ?anchors.as_slice(),
                %region,
                "resolving daily record"
            );
        }

        if options.cache_enabled {
            if let Some(resolution) = self.lookup_cache(&attempts, &anchors, region, options) {
                return Some(resolution);
            }
        }

        if let Some(resolution) = self.match_day_rows(&attempts, &anchors, region, options) {
            return Some(resolution);
        }

        self.match_recent_rows(&attempts, region, options)
    }

    fn lookup_cache(
        &self,
        attempts: &SubjectAttempts,
        anchors: &DayAnchors,
        region: Region,
        options: &ResolveOptions,
    ) -> Option<Resolution> {
        let requester = options.requester_id.as_deref();
        for anchor in anchors {
            for attempt in attempts {
                let key = CacheKey::new(requester, attempt, region, anchor);
                let Some(record) = self.cache.get(&key) else {
                    continue;
                };
                if !record.is_well_formed() {
                    if options.debug {
                        tracing::debug!(stage = "cache", %key, "skipping malformed cache entry");
                    }
                    continue;
                }
                if options.debug {
                    tracing::debug!(stage = "cache", %key, "cache hit");
                }
                return Some(Resolution {
                    record,
                    stage: ResolutionStage::Cache,
                    matched_subject: attempt.clone(),
                    anchor: Some(anchor.clone()),
                });
            }
        }
        None
    }

    fn match_day_rows(
        &self,
        attempts: &SubjectAttempts,
        anchors: &DayAnchors,
        region: Region,
        options: &ResolveOptions,
    ) -> Option<Resolution> {
        let variants = region.variants();
        for anchor in anchors {
            let rows = match self.source.list_by_day_and_region(anchor, &variants) {
                Ok(rows) => rows,
                Err(err) => {
                    if options.debug {
                        tracing::debug!(
                            stage = "remote_day",
                            anchor = anchor.as_str(),
                            error = %err,
                            "row fetch failed"
                        );
                    }
                    continue;
                }
            };
            if options.debug {
                tracing::debug!(
                    stage = "remote_day",
                    anchor = anchor.as_str(),
                    rows = rows.len(),
                    "rows fetched"
                );
            }

            let Some((attempt, record)) = match_rows(attempts, rows) else {
                continue;
            };
            if options.cache_enabled {
                let key = CacheKey::new(options.requester_id.as_deref(), &attempt, region, anchor);
                self.cache.put(&key, &record);
            }
            return Some(Resolution {
                record,
                stage: ResolutionStage::RemoteDay,
                matched_subject: attempt,
                anchor: Some(anchor.clone()),
            });
        }
        None
    }

    fn match_recent_rows(
        &self,
        attempts: &SubjectAttempts,
        region: Region,
        options: &ResolveOptions,
    ) -> Option<Resolution> {
        let rows = match self.source.list_recent_by_region(&region.variants(), self.recent_limit) {
            Ok(rows) => rows,
            Err(err) => {
                if options.debug {
                    tracing::debug!(stage = "remote_recent", error = %err, "row fetch failed");
                }
                return None;
            }
        };
        if options.debug {
            tracing::debug!(stage = "remote_recent", rows = rows.len(), "rows fetched");
        }

        let (attempt, record) = match_rows(attempts, rows)?;
        Some(Resolution {
            record,
            stage: ResolutionStage::RemoteRecent,
            matched_subject: attempt,
            anchor: None,
        })
    }

    /// Convenience wrapper for profile-shaped callers.
    ///
    /// Prefers the compound label over the plain one and falls back to the
    /// profile's requester id when the options carry none.
    pub fn resolve_for_profile(
        &self,
        profile: &SubjectProfile,
        options: &ResolveOptions,
    ) -> Option<DailyView> {
        let subject = profile.preferred_subject()?;
        let mut options = options.clone();
        if options.requester_id.is_none() {
            options.requester_id.clone_from(&profile.requester_id);
        }
        self.resolve(subject, profile.region.as_deref(), &options).map(DailyView::from)
    }
}

/// First row matching the most specific attempt; attempts are tried in order.
fn match_rows(attempts: &SubjectAttempts, rows: Vec<RawRow>) -> Option<(String, DailyRecord)> {
    let records = rows.into_iter().filter_map(RawRow::into_record).collect::<Vec<_>>();
    for attempt in attempts {
        if let Some(record) =
            records.iter().find(|record| labels_equivalent(attempt, &record.subject))
        {
            return Some((attempt.clone(), record.clone()));
        }
    }
    None
}

pub type SharedCache = Arc<dyn CacheStore + Send + Sync>;

/// Process-wide cache: on-disk when a path is given, in-memory otherwise.
#[must_use]
pub fn open_cache(path: Option<&Path>) -> SharedCache {
    match path {
        Some(path) => Arc::new(SqliteCache::open(path)),
        None => Arc::new(MemoryCache::new()),
    }
}

/// Build a resolver over the REST row source, configured from the environment.
///
/// # Errors
/// Returns an error when the remote row source configuration is incomplete.
pub fn resolver_from_env() -> Result<DailyRecordResolver<RestRowSource, SharedCache>> {
    let config = RemoteConfig::from_env()?;
    let cache_path = std::env::var(CACHE_PATH_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let cache = open_cache(cache_path.as_deref().map(Path::new));
    Ok(DailyRecordResolver::new(RestRowSource::new(config), cache))
}
