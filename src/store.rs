//! SQLite-backed relational store shared by the registry and both
//! association tables.
//!
//! The schema is applied inline via `include_str!` on every open. All
//! multi-statement mutations run inside a [`UnitOfWork`] so that the
//! duplicate check and the insert (or every row of a propagation) commit
//! together. Units of work take the write lock up front (`BEGIN IMMEDIATE`)
//! so concurrent writers queue on the busy timeout instead of failing when a
//! deferred read transaction tries to upgrade. The `UNIQUE` constraints in
//! the schema remain the backstop for writers on the same natural key.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::error::{Error, Result};

const SCHEMA: &str = include_str!("../migrations/001_schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// An open transaction. Dropping it without [`Transaction::commit`] rolls
/// every statement back.
pub type UnitOfWork = Transaction<'static, Sqlite>;

/// Handle to the relational store.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database file at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the parent directory cannot be created, and
    /// [`Error::Database`] if the file cannot be opened or the schema fails to
    /// apply.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("trusted_schema", "OFF")
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "guardrail store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// In-memory databases are per-connection, so the pool is limited to a
    /// single connection. Callers must not read through the pool while
    /// holding a [`UnitOfWork`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the schema fails to apply.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Begin a write transaction holding the database write lock.
    ///
    /// Every unit of work reads before it writes, so the lock is taken at
    /// `BEGIN` rather than on the first write. A second writer waits up to the
    /// busy timeout and then sees the first one's committed rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if no connection is available or the lock
    /// is not granted within the busy timeout.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Underlying pool, for committed-state reads.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Current time, truncated to microseconds so it survives a text round-trip.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse_timestamp(&format_timestamp(&now)).unwrap_or(now)
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| Error::Corrupt {
            field: "timestamp",
            value: raw.to_owned(),
        })
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
