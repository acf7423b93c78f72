use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

mod anchor;
mod cache;
mod label;

pub use anchor::{build_anchors, format_day, Clock, DayAnchors, FixedClock, SystemClock};
pub use cache::{MemoryCache, NoCache};
pub use label::{labels_equivalent, normalize_label, NormalizedLabel, SubjectAttempts, EN_DASH};

/// Provenance marker stamped on every record resolved from the backing table.
pub const SOURCE_TAG: &str = "daily_records";

/// Requester segment used in cache keys when no identity is supplied.
pub const ANONYMOUS_REQUESTER: &str = "anon";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RecordError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid day anchor: {0}")]
    InvalidDay(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Region {
    Northern,
    Southern,
}

impl Region {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Northern => "Northern",
            Self::Southern => "Southern",
        }
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Northern => "NH",
            Self::Southern => "SH",
        }
    }

    /// Strict recognizer: full names and two-letter codes, case-insensitive.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "northern" | "nh" => Some(Self::Northern),
            "southern" | "sh" => Some(Self::Southern),
            _ => None,
        }
    }

    /// Textual forms the backing table may hold for this region, first-seen order.
    #[must_use]
    pub fn variants(self) -> Vec<String> {
        let name = self.as_str();
        let mut variants: Vec<String> = Vec::with_capacity(4);
        for candidate in [
            name.to_string(),
            name.to_ascii_uppercase(),
            name.to_ascii_lowercase(),
            self.code().to_string(),
        ] {
            if !variants.contains(&candidate) {
                variants.push(candidate);
            }
        }
        variants
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map any region spelling to one of the two canonical regions.
///
/// Unrecognized or missing input resolves to [`Region::Southern`]; callers never
/// receive a failure for region input.
#[must_use]
pub fn to_canonical_region(input: Option<&str>) -> Region {
    input.and_then(Region::parse).unwrap_or(Region::Southern)
}

fn default_source_tag() -> String {
    SOURCE_TAG.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    pub subject: String,
    pub region: Region,
    pub day: String,
    #[serde(default)]
    pub primary_text: String,
    #[serde(default)]
    pub affirmation: String,
    #[serde(default)]
    pub deeper_insight: String,
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

impl DailyRecord {
    /// A record is usable only when its identifying fields are populated.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.subject.trim().is_empty() && !self.day.trim().is_empty()
    }
}

/// One row as returned by a [`RowSource`], before coercion into a [`DailyRecord`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RawRow {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default, alias = "primaryText")]
    pub primary_text: Option<String>,
    #[serde(default)]
    pub affirmation: Option<String>,
    #[serde(default, alias = "deeperInsight")]
    pub deeper_insight: Option<String>,
}

impl RawRow {
    /// Coerce into the fixed record shape.
    ///
    /// Missing content fields become empty strings and the region is canonicalized.
    /// Returns `None` when the row has no subject or no day.
    #[must_use]
    pub fn into_record(self) -> Option<DailyRecord> {
        let subject = self.subject.filter(|value| !value.trim().is_empty())?;
        let day = self.day.filter(|value| !value.trim().is_empty())?;
        Some(DailyRecord {
            subject,
            region: to_canonical_region(self.region.as_deref()),
            day,
            primary_text: self.primary_text.unwrap_or_default(),
            affirmation: self.affirmation.unwrap_or_default(),
            deeper_insight: self.deeper_insight.unwrap_or_default(),
            source_tag: default_source_tag(),
        })
    }
}

/// Flat cache namespace key: requester, subject attempt, region, day anchor.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn new(requester: Option<&str>, subject: &str, region: Region, day: &str) -> Self {
        let requester = requester
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(ANONYMOUS_REQUESTER);
        Self(format!("daily_record:{requester}:{subject}:{region}:{day}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read access to the backing table.
pub trait RowSource {
    /// Rows whose day lies in `[day 00:00Z, day+1 00:00Z)` and whose region equals any variant.
    ///
    /// # Errors
    /// Returns [`RecordError`] when the day is malformed or the store cannot be queried.
    fn list_by_day_and_region(
        &self,
        day: &str,
        region_variants: &[String],
    ) -> Result<Vec<RawRow>, RecordError>;

    /// Most recent `limit` rows for any region variant, newest day first.
    ///
    /// # Errors
    /// Returns [`RecordError`] when the store cannot be queried.
    fn list_recent_by_region(
        &self,
        region_variants: &[String],
        limit: usize,
    ) -> Result<Vec<RawRow>, RecordError>;
}

impl<T: RowSource + ?Sized> RowSource for Arc<T> {
    fn list_by_day_and_region(
        &self,
        day: &str,
        region_variants: &[String],
    ) -> Result<Vec<RawRow>, RecordError> {
        (**self).list_by_day_and_region(day, region_variants)
    }

    fn list_recent_by_region(
        &self,
        region_variants: &[String],
        limit: usize,
    ) -> Result<Vec<RawRow>, RecordError> {
        (**self).list_recent_by_region(region_variants, limit)
    }
}

/// Best-effort key/value record cache.
///
/// Implementations swallow every storage failure: `get` reports a miss and `put`
/// does nothing.
pub trait CacheStore {
    fn get(&self, key: &CacheKey) -> Option<DailyRecord>;
    fn put(&self, key: &CacheKey, record: &DailyRecord);
}

impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    fn get(&self, key: &CacheKey) -> Option<DailyRecord> {
        (**self).get(key)
    }

    fn put(&self, key: &CacheKey, record: &DailyRecord) {
        (**self).put(key, record);
    }
}

/// Half-open UTC interval covering one `YYYY-MM-DD` day.
///
/// # Errors
/// Returns [`RecordError::InvalidDay`] when `day` is not a valid calendar date.
pub fn day_bounds(day: &str) -> Result<(OffsetDateTime, OffsetDateTime), RecordError> {
    let date = Date::parse(day.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|err| RecordError::InvalidDay(format!("{day}: {err}")))?;
    let next = date
        .next_day()
        .ok_or_else(|| RecordError::InvalidDay(format!("{day}: no following day")))?;
    Ok((date.midnight().assume_utc(), next.midnight().assume_utc()))
}
