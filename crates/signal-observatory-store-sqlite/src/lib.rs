#![allow(clippy::missing_errors_doc)]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use signal_observatory_core::{
    format_date, format_rfc3339, normalize_events, now_utc, parse_timestamp, Event, EventStore,
    FetchQuery, GroupKey, ObservatoryError, RawEvent,
};
use time::OffsetDateTime;

mod benchmark;

pub use benchmark::{
    run_benchmark, BenchmarkConfig, BenchmarkReport, BenchmarkThresholds, BenchmarkVolumeResult,
};

const SIGNAL_EVENTS_MIGRATION_VERSION: i64 = 1;

const SCHEMA_SIGNAL_EVENTS_V1: &str = r"
CREATE TABLE IF NOT EXISTS signal_events (
  event_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  event_id TEXT NOT NULL CHECK (length(event_id) > 0),
  event_ts TEXT NOT NULL,
  event_ts_unix_nanos INTEGER NOT NULL,
  event_date TEXT NOT NULL,
  source_id TEXT NOT NULL CHECK (length(source_id) > 0),
  signal_name TEXT NOT NULL CHECK (length(signal_name) > 0),
  signal_value REAL NOT NULL,
  quality_score REAL NOT NULL CHECK (quality_score BETWEEN 0.0 AND 1.0),
  run_id TEXT NOT NULL CHECK (length(run_id) > 0),
  recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_signal_events_ts
  ON signal_events(event_ts_unix_nanos DESC, event_seq DESC);

CREATE INDEX IF NOT EXISTS idx_signal_events_group_ts
  ON signal_events(source_id, signal_name, event_ts_unix_nanos);

CREATE TRIGGER IF NOT EXISTS trg_signal_events_no_update
BEFORE UPDATE ON signal_events
BEGIN
  SELECT RAISE(FAIL, 'signal_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_signal_events_no_delete
BEFORE DELETE ON signal_events
BEGIN
  SELECT RAISE(FAIL, 'signal_events is append-only');
END;
";

const DROP_SIGNAL_EVENTS: &str = r"
DROP TRIGGER IF EXISTS trg_signal_events_no_update;
DROP TRIGGER IF EXISTS trg_signal_events_no_delete;
DROP TABLE IF EXISTS signal_events;
";

const SELECT_EVENT_COLUMNS: &str = "SELECT
    event_id, event_ts, source_id, signal_name, signal_value, quality_score, run_id
 FROM signal_events";

/// Durable append-only event store backed by a single SQLite file.
pub struct SqliteEventStore {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub key: GroupKey,
    pub event_count: usize,
    pub latest_event_ts: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub total_events: usize,
    pub latest_event_ts: Option<OffsetDateTime>,
    pub groups: Vec<GroupSummary>,
}

impl SqliteEventStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && path != Path::new(":memory:") {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Opens and migrates in one step.
    pub fn open_migrated(path: &Path) -> Result<Self> {
        let store = Self::open(path)?;
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_SIGNAL_EVENTS_V1)
            .context("failed to apply signal_events schema")?;

        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![SIGNAL_EVENTS_MIGRATION_VERSION, now],
            )
            .context("failed to register signal_events schema migration")?;

        Ok(())
    }

    /// Normalizes and appends `events` in one transaction.
    ///
    /// Validation runs before the transaction opens, so an invalid event
    /// leaves the store untouched. The schema is created when absent.
    pub fn append_events(&mut self, events: &[RawEvent]) -> Result<usize> {
        let normalized = normalize_events(events).map_err(anyhow::Error::new)?;
        if normalized.is_empty() {
            return Ok(0);
        }

        let recorded_at = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start append transaction")?;
        tx.execute_batch(SCHEMA_SIGNAL_EVENTS_V1)
            .context("failed to ensure signal_events schema")?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO signal_events(
                        event_id, event_ts, event_ts_unix_nanos, event_date,
                        source_id, signal_name, signal_value, quality_score,
                        run_id, recorded_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .context("failed to prepare signal event insert")?;

            for event in &normalized {
                stmt.execute(params![
                    event.event_id,
                    format_rfc3339(event.event_ts).map_err(|err| anyhow!(err.to_string()))?,
                    unix_nanos(event.event_ts)?,
                    format_date(event.event_date),
                    event.source_id,
                    event.signal_name,
                    event.signal_value,
                    event.quality_score,
                    event.run_id,
                    recorded_at,
                ])
                .with_context(|| format!("failed to append signal event {}", event.event_id))?;
            }
        }

        tx.commit().context("failed to commit append transaction")?;

        tracing::info!(appended = normalized.len(), "appended signal events");
        Ok(normalized.len())
    }

    /// Newest-first events, ties broken by insertion order (newest first).
    /// A store without the events table reads as empty.
    pub fn fetch_events(&self, query: &FetchQuery) -> Result<Vec<Event>> {
        if !table_exists(&self.conn, "signal_events")? {
            return Ok(Vec::new());
        }

        let limit = match query.limit {
            Some(limit) => i64::try_from(limit).unwrap_or(i64::MAX),
            None => -1,
        };

        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_EVENT_COLUMNS}
             WHERE (?1 IS NULL OR source_id = ?1)
               AND (?2 IS NULL OR signal_name = ?2)
             ORDER BY event_ts_unix_nanos DESC, event_seq DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![query.source_id, query.signal_name, limit],
            parse_event_row,
        )?;

        collect_rows(rows)
    }

    /// Drops and recreates the events table. Safe to repeat.
    pub fn reset(&mut self) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start reset transaction")?;
        tx.execute_batch(DROP_SIGNAL_EVENTS)
            .context("failed to drop signal_events")?;
        tx.execute_batch(SCHEMA_SIGNAL_EVENTS_V1)
            .context("failed to recreate signal_events")?;
        tx.commit().context("failed to commit reset transaction")?;

        tracing::warn!("signal_events reset; all persisted events were removed");
        Ok(())
    }

    pub fn count_events(&self) -> Result<usize> {
        if !table_exists(&self.conn, "signal_events")? {
            return Ok(0);
        }
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM signal_events", [], |row| row.get(0))
            .context("failed to count signal events")?;
        usize::try_from(count).with_context(|| format!("invalid event count: {count}"))
    }

    pub fn latest_event_ts(&self) -> Result<Option<OffsetDateTime>> {
        if !table_exists(&self.conn, "signal_events")? {
            return Ok(None);
        }
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT event_ts FROM signal_events
                 ORDER BY event_ts_unix_nanos DESC, event_seq DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read latest event timestamp")?;

        raw.as_deref()
            .map(|value| parse_timestamp(value).map_err(|err| anyhow!(err.to_string())))
            .transpose()
    }

    pub fn group_summaries(&self) -> Result<Vec<GroupSummary>> {
        if !table_exists(&self.conn, "signal_events")? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT source_id, signal_name, COUNT(*), MAX(event_ts_unix_nanos)
             FROM signal_events
             GROUP BY source_id, signal_name
             ORDER BY source_id ASC, signal_name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(2)?;
            let latest_nanos: i64 = row.get(3)?;
            let latest_event_ts = OffsetDateTime::from_unix_timestamp_nanos(i128::from(
                latest_nanos,
            ))
            .map_err(|err| conversion_error(3, rusqlite::types::Type::Integer, err.to_string()))?;
            let event_count = usize::try_from(count).map_err(|_| {
                conversion_error(
                    2,
                    rusqlite::types::Type::Integer,
                    format!("invalid group count: {count}"),
                )
            })?;

            Ok(GroupSummary {
                key: GroupKey {
                    source_id: row.get(0)?,
                    signal_name: row.get(1)?,
                },
                event_count,
                latest_event_ts,
            })
        })?;

        collect_rows(rows)
    }

    pub fn status(&self) -> Result<StoreStatus> {
        Ok(StoreStatus {
            total_events: self.count_events()?,
            latest_event_ts: self.latest_event_ts()?,
            groups: self.group_summaries()?,
        })
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl EventStore for SqliteEventStore {
    fn append(&mut self, events: &[RawEvent]) -> Result<usize, ObservatoryError> {
        self.append_events(events).map_err(classify_error)
    }

    fn fetch(&self, query: &FetchQuery) -> Result<Vec<Event>, ObservatoryError> {
        self.fetch_events(query).map_err(classify_error)
    }

    fn reset(&mut self) -> Result<(), ObservatoryError> {
        SqliteEventStore::reset(self).map_err(classify_error)
    }
}

/// Keeps validation failures as they are and reports everything else as an
/// unavailable store.
fn classify_error(err: anyhow::Error) -> ObservatoryError {
    match err.downcast::<ObservatoryError>() {
        Ok(err) => err,
        Err(err) => ObservatoryError::StoreUnavailable(format!("{err:#}")),
    }
}

fn parse_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let event_ts_raw: String = row.get(1)?;
    let event_ts = parse_timestamp(&event_ts_raw).map_err(|err| {
        conversion_error(1, rusqlite::types::Type::Text, err.to_string())
    })?;

    Ok(Event {
        event_id: row.get(0)?,
        event_ts,
        event_date: event_ts.date(),
        source_id: row.get(2)?,
        signal_name: row.get(3)?,
        signal_value: row.get(4)?,
        quality_score: row.get(5)?,
        run_id: row.get(6)?,
    })
}

fn conversion_error(
    index: usize,
    sql_type: rusqlite::types::Type,
    message: String,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        sql_type,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message,
        )),
    )
}

fn unix_nanos(value: OffsetDateTime) -> Result<i64> {
    i64::try_from(value.unix_timestamp_nanos())
        .map_err(|_| anyhow!("timestamp out of storable range: {value}"))
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1
             FROM sqlite_master
             WHERE type = 'table' AND name = ?1
             LIMIT 1",
            params![table_name],
            |_| Ok(()),
        )
        .optional()
        .context("failed to query sqlite_master")?
        .is_some();

    Ok(exists)
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}
