//! REST-backed [`RowSource`] for a PostgREST-style table endpoint.
//!
//! Every request is a single GET with filters encoded as query parameters:
//! `day=gte.<start>&day=lt.<end>` for the day window, `region=in.(...)` for the
//! region variants, `order=day.desc` and `limit=N` for the recency window.

use std::time::Duration;

use anyhow::{anyhow, Result};
use daily_record_core::{day_bounds, RawRow, RecordError, RowSource};
use time::format_description::well_known::Rfc3339;

pub const REMOTE_URL_ENV: &str = "DAILY_RECORD_REMOTE_URL";
pub const REMOTE_API_KEY_ENV: &str = "DAILY_RECORD_REMOTE_API_KEY";
pub const REMOTE_TABLE_ENV: &str = "DAILY_RECORD_REMOTE_TABLE";
pub const REMOTE_TIMEOUT_MS_ENV: &str = "DAILY_RECORD_REMOTE_TIMEOUT_MS";

pub const DEFAULT_TABLE: &str = "daily_records";
pub const DEFAULT_TIMEOUT_MS: u64 = 8_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub table: String,
    pub timeout_ms: u64,
}

impl RemoteConfig {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: None,
            table: DEFAULT_TABLE.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns an error when the base URL variable is unset or blank.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns an error when the base URL variable is unset or blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_blank = |name: &str| {
            lookup(name).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
        };

        let base_url = non_blank(REMOTE_URL_ENV)
            .ok_or_else(|| anyhow!("{REMOTE_URL_ENV} MUST be set for the remote row source"))?;
        let mut config = Self::new(&base_url);
        config.api_key = non_blank(REMOTE_API_KEY_ENV);
        if let Some(table) = non_blank(REMOTE_TABLE_ENV) {
            config.table = table;
        }
        config.timeout_ms = non_blank(REMOTE_TIMEOUT_MS_ENV)
            .and_then(|value| value.parse::<u64>().ok())
            .map_or(DEFAULT_TIMEOUT_MS, |value| value.clamp(100, 30_000));
        Ok(config)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

fn quote_in_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn region_filter(region_variants: &[String]) -> String {
    let quoted = region_variants.iter().map(|value| quote_in_value(value)).collect::<Vec<_>>();
    format!("in.({})", quoted.join(","))
}

/// Query parameters for the rows of one UTC day across region variants.
///
/// # Errors
/// Returns [`RecordError::InvalidDay`] when `day` is not a `YYYY-MM-DD` date.
pub fn day_query(
    day: &str,
    region_variants: &[String],
) -> Result<Vec<(String, String)>, RecordError> {
    let (start, end) = day_bounds(day)?;
    let render = |value: time::OffsetDateTime| {
        value
            .format(&Rfc3339)
            .map_err(|err| RecordError::InvalidDay(format!("failed to format day bound: {err}")))
    };
    Ok(vec![
        ("select".to_string(), "*".to_string()),
        ("day".to_string(), format!("gte.{}", render(start)?)),
        ("day".to_string(), format!("lt.{}", render(end)?)),
        ("region".to_string(), region_filter(region_variants)),
        ("order".to_string(), "day.desc".to_string()),
    ])
}

/// Query parameters for the newest `limit` rows across region variants.
#[must_use]
pub fn recent_query(region_variants: &[String], limit: usize) -> Vec<(String, String)> {
    vec![
        ("select".to_string(), "*".to_string()),
        ("region".to_string(), region_filter(region_variants)),
        ("order".to_string(), "day.desc".to_string()),
        ("limit".to_string(), limit.to_string()),
    ]
}

/// Decode a JSON array response body into raw rows.
///
/// # Errors
/// Returns [`RecordError::Decode`] when the body is not a JSON array of row objects.
pub fn parse_rows(body: &str) -> Result<Vec<RawRow>, RecordError> {
    serde_json::from_str::<Vec<RawRow>>(body)
        .map_err(|err| RecordError::Decode(format!("failed parsing row response: {err}")))
}

pub struct RestRowSource {
    agent: ureq::Agent,
    config: RemoteConfig,
}

impl RestRowSource {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        let agent =
            ureq::AgentBuilder::new().timeout(Duration::from_millis(config.timeout_ms)).build();
        Self { agent, config }
    }

    #[must_use]
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn fetch(&self, query: &[(String, String)]) -> Result<Vec<RawRow>, RecordError> {
        let url = self.config.table_url();
        let mut request = self.agent.get(&url).set("Accept", "application/json");
        if let Some(api_key) = &self.config.api_key {
            request =
                request.set("apikey", api_key).set("Authorization", &format!("Bearer {api_key}"));
        }
        for (name, value) in query {
            request = request.query(name, value);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                // Body length only; row payloads stay out of logs.
                let bytes = response.into_string().map(|body| body.len()).unwrap_or_default();
                tracing::debug!(status, bytes, "row query rejected");
                return Err(RecordError::Query(format!("HTTP {status} from {url}")));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(RecordError::Transport(format!("request to {url} failed: {err}")));
            }
        };

        let status = response.status();
        let body = response
            .into_string()
            .map_err(|err| RecordError::Transport(format!("failed reading row response: {err}")))?;
        tracing::debug!(status, bytes = body.len(), "row query completed");
        parse_rows(&body)
    }
}

impl RowSource for RestRowSource {
    fn list_by_day_and_region(
        &self,
        day: &str,
        region_variants: &[String],
    ) -> Result<Vec<RawRow>, RecordError> {
        let query = day_query(day, region_variants)?;
        self.fetch(&query)
    }

    fn list_recent_by_region(
        &self,
        region_variants: &[String],
        limit: usize,
    ) -> Result<Vec<RawRow>, RecordError> {
        self.fetch(&recent_query(region_variants, limit))
    }
}
