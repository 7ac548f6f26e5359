//! `wp_store` - Snapshot storage for wfm-poller
//!
//! This crate provides:
//! - The persisted row shape ([`SnapshotRow`])
//! - The [`SnapshotStore`] trait the pipeline writes through
//! - A `DuckDB` backend with schema migrations ([`DuckStore`])
//! - A Supabase / PostgREST backend ([`RestStore`])

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub mod migrations;
pub mod rest;
pub mod schema;

pub use rest::RestStore;

/// Maximum number of characters of a remote response body kept in errors
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] duckdb::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Supabase error {status}: {body}")]
    StatusError { status: u16, body: String },

    #[error("Store misconfigured: {0}")]
    ConfigError(String),
}

/// Truncate a response body to at most `max_chars` characters
#[must_use]
pub fn body_excerpt(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

/// Canonical text form of a snapshot timestamp (`2024-01-15T10:00:00.123456+00:00`)
#[must_use]
pub fn format_snapshot_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Serde helper keeping `snapshot_ts` in its canonical text form
mod snapshot_ts_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_snapshot_ts(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// One agent's state at one poll.
///
/// All rows written by a single poll share `snapshot_ts`; it is the batch's
/// logical time, not the agent's state time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    #[serde(with = "snapshot_ts_serde")]
    pub snapshot_ts: DateTime<Utc>,
    pub username: String,
    pub full_name: String,
    pub state: String,
    pub reason_code: String,
    /// Five9 local time, verbatim
    pub state_since: String,
    /// `state_since` shifted to UTC, or the raw value if it could not be parsed
    pub state_since_utc: String,
    pub state_duration: String,
    pub campaign_name: String,
    pub call_type: String,
    pub media_availability: String,
}

/// Write/delete access to the durable snapshot set
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Insert a batch of rows, returning how many were written
    async fn insert_snapshot_rows(&self, rows: &[SnapshotRow]) -> Result<usize, StoreError>;

    /// Delete every row with `snapshot_ts < cutoff`, returning how many were deleted
    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// `DuckDB`-backed snapshot store. Clones share one connection.
#[derive(Clone)]
pub struct DuckStore {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

/// Timestamp form bound into `DuckDB` `TIMESTAMP` columns (naive UTC)
fn duck_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

impl DuckStore {
    /// Open or create database at path
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if directory creation, database opening, or
    /// migration execution fails.
    #[instrument]
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        info!(path = %path.display(), "Opening DuckDB database");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_string_lossy().to_string(),
        };

        store.run_migrations()?;

        Ok(store)
    }

    /// Open in-memory database (for testing)
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if in-memory database setup or migrations fail.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: ":memory:".to_string(),
        };

        store.run_migrations()?;

        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::QueryError("database mutex poisoned".to_string()))
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let applied = migrations::run_all(&mut conn)?;
        debug!(applied, db_path = %self.db_path, "Migrations checked");
        Ok(())
    }

    /// Get database path
    #[must_use]
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Insert rows in one transaction; either all rows land or none do
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any insert or the commit fails.
    pub fn insert_rows(&self, rows: &[SnapshotRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let sql = format!(
                "INSERT INTO {} (snapshot_ts, username, full_name, state, reason_code, \
                 state_since, state_since_utc, state_duration, campaign_name, call_type, \
                 media_availability) \
                 VALUES (CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                schema::tables::AGENT_SNAPSHOTS
            );
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(duckdb::params![
                    duck_timestamp(&row.snapshot_ts),
                    row.username,
                    row.full_name,
                    row.state,
                    row.reason_code,
                    row.state_since,
                    row.state_since_utc,
                    row.state_duration,
                    row.campaign_name,
                    row.call_type,
                    row.media_availability,
                ])?;
            }
        }
        tx.commit()?;

        debug!(rows = rows.len(), "Inserted snapshot rows");
        Ok(rows.len())
    }

    /// Delete rows strictly older than `cutoff`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    pub fn delete_before(&self, cutoff: &DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "DELETE FROM {} WHERE {} < CAST(? AS TIMESTAMP)",
            schema::tables::AGENT_SNAPSHOTS,
            schema::columns::SNAPSHOT_TS
        );
        let deleted = conn.execute(&sql, [duck_timestamp(cutoff)])?;
        Ok(deleted)
    }
}

/// Read-back helpers for tests of code that writes through a [`DuckStore`]
#[cfg(any(test, feature = "test-utils"))]
impl DuckStore {
    /// Total number of stored rows
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the count query fails.
    pub fn row_count(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM {}", schema::tables::AGENT_SNAPSHOTS);
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    /// Most recent rows as JSON, newest snapshot first
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if query execution fails or row JSON cannot be parsed.
    pub fn recent_rows(&self, limit: usize) -> Result<Vec<serde_json::Value>, StoreError> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT to_json(_row) FROM (SELECT * FROM {}) AS _row \
             ORDER BY _row.{} DESC, _row.username LIMIT {limit}",
            schema::tables::AGENT_SNAPSHOTS,
            schema::columns::SNAPSHOT_TS
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let json_str: String = row.get(0)?;
            let value: serde_json::Value = serde_json::from_str(&json_str)
                .map_err(|e| StoreError::QueryError(format!("JSON parse error: {e}")))?;
            results.push(value);
        }
        Ok(results)
    }
}

#[async_trait]
impl SnapshotStore for DuckStore {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    async fn insert_snapshot_rows(&self, rows: &[SnapshotRow]) -> Result<usize, StoreError> {
        let store = self.clone();
        let rows = rows.to_vec();
        run_blocking(move || store.insert_rows(&rows)).await
    }

    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let store = self.clone();
        run_blocking(move || store.delete_before(&cutoff)).await
    }
}

/// Run synchronous `DuckDB` work on the blocking pool
async fn run_blocking<T, F>(work: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::QueryError(format!("blocking task failed: {e}")))?
}
