use std::path::Path;

use anyhow::{anyhow, Context, Result};
use daily_record_core::{day_bounds, RawRow, RecordError, RowSource};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

mod cache;

pub use cache::SqliteCache;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS daily_records (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  subject TEXT NOT NULL,
  region TEXT NOT NULL DEFAULT '',
  day TEXT NOT NULL,
  primary_text TEXT,
  affirmation TEXT,
  deeper_insight TEXT
);

CREATE INDEX IF NOT EXISTS idx_daily_records_region_day ON daily_records(region, day);
";

const SELECT_COLUMNS: &str = "subject, region, day, primary_text, affirmation, deeper_insight";

/// Local tabular store exposing the same two query shapes as the remote table.
///
/// Day values may be date-only or timestamps; comparisons go through `julianday`
/// so both compare as UTC instants.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a SQLite-backed record table and configure runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;
        Self::configure(conn)
    }

    /// Open a private in-memory table.
    ///
    /// # Errors
    /// Returns an error when pragmas cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite")?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;
        Ok(Self { conn })
    }

    /// Current applied schema version, `0` for an empty database.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read.
    pub fn schema_version(&self) -> Result<i64> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        current_schema_version(&self.conn)
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version()?;

        if version < 1 {
            let tx = self.conn.transaction().context("failed to start migration v1 transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).context("failed to create daily_records")?;
            record_schema_version(&tx, 1)?;
            tx.commit().context("failed to commit migration v1")?;
        }

        let version = current_schema_version(&self.conn)?;
        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Insert one row, used to seed local fixtures.
    ///
    /// # Errors
    /// Returns an error when subject or day is missing, or the insert fails.
    pub fn insert_row(&mut self, row: &RawRow) -> Result<()> {
        let subject = row
            .subject
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("subject MUST be provided"))?;
        let day = row
            .day
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("day MUST be provided"))?;

        self.conn
            .execute(
                "INSERT INTO daily_records(subject, region, day, primary_text, affirmation, deeper_insight)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    subject,
                    row.region.as_deref().unwrap_or_default(),
                    day,
                    row.primary_text,
                    row.affirmation,
                    row.deeper_insight,
                ],
            )
            .context("failed to insert daily record row")?;
        Ok(())
    }

    fn query_rows(&self, sql: &str, values: Vec<String>) -> Result<Vec<RawRow>, RecordError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|err| RecordError::Query(format!("failed to prepare row query: {err}")))?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(RawRow {
                    subject: row.get(0)?,
                    region: row.get(1)?,
                    day: row.get(2)?,
                    primary_text: row.get(3)?,
                    affirmation: row.get(4)?,
                    deeper_insight: row.get(5)?,
                })
            })
            .map_err(|err| RecordError::Query(format!("failed to run row query: {err}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| RecordError::Decode(format!("failed to read daily record row: {err}")))
    }
}

fn placeholders(first: usize, count: usize) -> String {
    (first..first + count).map(|index| format!("?{index}")).collect::<Vec<_>>().join(", ")
}

fn rfc3339(value: OffsetDateTime) -> Result<String, RecordError> {
    value
        .format(&Rfc3339)
        .map_err(|err| RecordError::InvalidDay(format!("failed to format day bound: {err}")))
}

impl RowSource for SqliteStore {
    fn list_by_day_and_region(
        &self,
        day: &str,
        region_variants: &[String],
    ) -> Result<Vec<RawRow>, RecordError> {
        let (start, end) = day_bounds(day)?;
        if region_variants.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {SELECT_COLUMNS}
             FROM daily_records
             WHERE region IN ({})
               AND julianday(day) >= julianday(?1)
               AND julianday(day) < julianday(?2)
             ORDER BY julianday(day) DESC, id DESC",
            placeholders(3, region_variants.len())
        );
        let mut values = vec![rfc3339(start)?, rfc3339(end)?];
        values.extend(region_variants.iter().cloned());
        self.query_rows(&sql, values)
    }

    fn list_recent_by_region(
        &self,
        region_variants: &[String],
        limit: usize,
    ) -> Result<Vec<RawRow>, RecordError> {
        if region_variants.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {SELECT_COLUMNS}
             FROM daily_records
             WHERE region IN ({})
             ORDER BY julianday(day) DESC, id DESC
             LIMIT {limit}",
            placeholders(1, region_variants.len())
        );
        self.query_rows(&sql, region_variants.to_vec())
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .optional()
        .context("failed to read schema version")?
        .flatten();
    Ok(version.unwrap_or(0))
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let applied_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("failed to format migration timestamp")?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, applied_at],
    )
    .context("failed to record schema version")?;
    Ok(())
}
