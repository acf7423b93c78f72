use std::cell::Cell;
use std::path::PathBuf;

use anyhow::Result;
use daily_record_api::{
    open_cache, DailyRecordResolver, ResolutionStage, ResolveOptions, SubjectProfile,
};
use daily_record_core::{CacheKey, CacheStore, FixedClock, RawRow, RecordError, Region, RowSource};
use daily_record_store_sqlite::{SqliteCache, SqliteStore};
use time::macros::{datetime, offset};
use time::UtcOffset;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("daily_record_api=debug"))
        .with_test_writer()
        .try_init();
}

fn unique_temp_cache_path() -> PathBuf {
    std::env::temp_dir().join(format!("daily-record-api-cache-{}.sqlite3", ulid::Ulid::new()))
}

/// Wraps the SQLite table and counts every row query issued against it.
struct CountingStore {
    inner: SqliteStore,
    calls: Cell<usize>,
}

impl CountingStore {
    fn seeded(rows: &[RawRow]) -> Result<Self> {
        let mut inner = SqliteStore::open_in_memory()?;
        inner.migrate()?;
        for row in rows {
            inner.insert_row(row)?;
        }
        Ok(Self { inner, calls: Cell::new(0) })
    }

    /// A table that was never migrated; every query fails.
    fn broken() -> Result<Self> {
        Ok(Self { inner: SqliteStore::open_in_memory()?, calls: Cell::new(0) })
    }
}

impl RowSource for CountingStore {
    fn list_by_day_and_region(
        &self,
        day: &str,
        region_variants: &[String],
    ) -> Result<Vec<RawRow>, RecordError> {
        self.calls.set(self.calls.get() + 1);
        self.inner.list_by_day_and_region(day, region_variants)
    }

    fn list_recent_by_region(
        &self,
        region_variants: &[String],
        limit: usize,
    ) -> Result<Vec<RawRow>, RecordError> {
        self.calls.set(self.calls.get() + 1);
        self.inner.list_recent_by_region(region_variants, limit)
    }
}

fn row(subject: &str, region: &str, day: &str, text: &str) -> RawRow {
    RawRow {
        subject: Some(subject.to_string()),
        region: Some(region.to_string()),
        day: Some(day.to_string()),
        primary_text: Some(text.to_string()),
        affirmation: None,
        deeper_insight: None,
    }
}

fn clock_at(offset: UtcOffset) -> FixedClock {
    FixedClock::new(datetime!(2026-10-16 12:00 UTC), Some(offset))
}

fn resolver(
    store: CountingStore,
) -> DailyRecordResolver<CountingStore, SqliteCache, FixedClock> {
    DailyRecordResolver::new(store, SqliteCache::open_in_memory())
        .with_clock(clock_at(UtcOffset::UTC))
}

// Test IDs: TAPI-001
#[test]
fn todays_row_resolves_and_is_cached_for_the_tuple() -> Result<()> {
    init_tracing();
    let store = CountingStore::seeded(&[row("Aries", "Northern", "2026-10-16", "Charge ahead.")])?;
    let resolver = resolver(store);
    let options = ResolveOptions { debug: true, ..ResolveOptions::default() };

    let record = resolver.resolve("Aries", Some("Northern"), &options);
    assert_eq!(record.as_ref().map(|record| record.primary_text.as_str()), Some("Charge ahead."));

    let key = CacheKey::new(None, "Aries", Region::Northern, "2026-10-16");
    assert_eq!(resolver.cache().get(&key), record);
    Ok(())
}

// Test IDs: TAPI-002
#[test]
fn en_dash_row_matches_without_component_fallback() -> Result<()> {
    let store = CountingStore::seeded(&[row(
        "Gemini\u{2013}Cancer Cusp",
        "Southern",
        "2026-10-16",
        "Two minds, one day.",
    )])?;
    let resolver = resolver(store);

    let options = ResolveOptions::default();
    let Some(resolution) =
        resolver.resolve_detailed("Gemini-Cancer Cusp", Some("Southern"), &options)
    else {
        panic!("dash-normalized equivalence should match the en-dash row");
    };
    assert_eq!(resolution.stage, ResolutionStage::RemoteDay);
    assert_eq!(resolution.record.primary_text, "Two minds, one day.");
    Ok(())
}

// Test IDs: TAPI-003
#[test]
fn unrecognized_region_reads_as_southern() -> Result<()> {
    let store = CountingStore::seeded(&[row("Aries", "NH", "2026-10-16", "Northern only.")])?;
    let resolver = resolver(store);

    assert_eq!(resolver.resolve("aries", Some("north"), &ResolveOptions::default()), None);
    assert!(resolver.resolve("aries", Some("nh"), &ResolveOptions::default()).is_some());
    Ok(())
}

// Test IDs: TAPI-004
#[test]
fn recency_fallback_returns_older_row_without_caching() -> Result<()> {
    let store = CountingStore::seeded(&[
        row("Aries", "NH", "2026-10-01", "Two weeks old."),
        row("Taurus", "NH", "2026-10-12", "Wrong subject."),
    ])?;
    let resolver = resolver(store);

    let Some(resolution) =
        resolver.resolve_detailed("aries", Some("northern"), &ResolveOptions::default())
    else {
        panic!("recency fallback should find the older row");
    };
    assert_eq!(resolution.stage, ResolutionStage::RemoteRecent);
    assert_eq!(resolution.record.primary_text, "Two weeks old.");
    assert!(resolver.cache().is_empty());
    // Three day anchors, then one recency query.
    assert_eq!(resolver.source().calls.get(), 4);
    Ok(())
}

// Test IDs: TAPI-005
#[test]
fn failing_table_resolves_to_none() -> Result<()> {
    init_tracing();
    let resolver = resolver(CountingStore::broken()?);
    let options = ResolveOptions { debug: true, ..ResolveOptions::default() };

    assert_eq!(resolver.resolve("Aries", Some("Northern"), &options), None);
    assert_eq!(resolver.source().calls.get(), 4);
    assert!(resolver.cache().is_empty());
    Ok(())
}

// Test IDs: TAPI-006
#[test]
fn repeated_resolve_issues_one_remote_call() -> Result<()> {
    let store = CountingStore::seeded(&[row("Leo", "SH", "2026-10-16T06:30:00Z", "Shine.")])?;
    let resolver = resolver(store);
    let options = ResolveOptions::default();

    let first = resolver.resolve("Leo", Some("Southern"), &options);
    let second = resolver.resolve("leo", Some("sh"), &options);

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(resolver.source().calls.get(), 1);
    Ok(())
}

// Test IDs: TAPI-007
#[test]
fn utc_day_row_is_found_when_local_day_runs_ahead() -> Result<()> {
    let store = CountingStore::seeded(&[row("Virgo", "Southern", "2026-10-16", "UTC day.")])?;
    let resolver = DailyRecordResolver::new(store, SqliteCache::open_in_memory())
        .with_clock(clock_at(offset!(+13)));

    let Some(resolution) =
        resolver.resolve_detailed("Virgo", Some("Southern"), &ResolveOptions::default())
    else {
        panic!("the UTC-today anchor should match");
    };
    assert_eq!(resolution.anchor.as_deref(), Some("2026-10-16"));
    // Local today (17th) is queried first.
    assert_eq!(resolver.source().calls.get(), 2);
    Ok(())
}

// Test IDs: TAPI-008
#[test]
fn profile_resolution_prefers_compound_label_and_namespaces_cache() -> Result<()> {
    let store = CountingStore::seeded(&[
        row("Gemini", "SH", "2026-10-16", "Plain sign."),
        row("Gemini\u{2013}Cancer Cusp", "SH", "2026-10-16", "Cusp text."),
    ])?;
    let resolver = resolver(store);
    let profile = SubjectProfile {
        requester_id: Some("user-7".to_string()),
        subject: Some("Gemini".to_string()),
        compound_subject: Some("gemini-cancer cusp".to_string()),
        region: Some("SH".to_string()),
    };

    let Some(view) = resolver.resolve_for_profile(&profile, &ResolveOptions::default()) else {
        panic!("profile should resolve through its compound label");
    };
    assert_eq!(view.body, "Cusp text.");
    assert_eq!(view.title, "Gemini\u{2013}Cancer Cusp");
    assert_eq!(view.region, Region::Southern);
    assert_eq!(view.affirmation, None);

    let namespaced =
        CacheKey::new(Some("user-7"), "Gemini\u{2013}Cancer Cusp", Region::Southern, "2026-10-16");
    assert!(resolver.cache().get(&namespaced).is_some());

    let json = serde_json::to_value(&view)?;
    assert_eq!(json["date"], "2026-10-16");
    assert!(json.get("deeperInsight").is_some());
    Ok(())
}

// Test IDs: TAPI-009
#[test]
fn file_cache_serves_a_fresh_resolver() -> Result<()> {
    let path = unique_temp_cache_path();
    {
        let store = CountingStore::seeded(&[row("Libra", "Northern", "2026-10-16", "Balance.")])?;
        let resolver = DailyRecordResolver::new(store, open_cache(Some(path.as_path())))
            .with_clock(clock_at(UtcOffset::UTC));
        assert!(resolver.resolve("Libra", Some("Northern"), &ResolveOptions::default()).is_some());
    }

    let empty = CountingStore::seeded(&[])?;
    let resolver = DailyRecordResolver::new(empty, open_cache(Some(path.as_path())))
        .with_clock(clock_at(UtcOffset::UTC));
    let resolution =
        resolver.resolve_detailed("Libra", Some("Northern"), &ResolveOptions::default());
    assert_eq!(resolution.map(|resolution| resolution.stage), Some(ResolutionStage::Cache));
    assert_eq!(resolver.source().calls.get(), 0);

    let _ = std::fs::remove_file(&path);
    Ok(())
}
