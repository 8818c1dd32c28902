//! Relational feed table
//!
//! A `feeds` table with one column per field and `time` stored as INTEGER
//! epoch milliseconds. Uses SQLite's B-tree index on `time` so the latest
//! feed is a single indexed lookup instead of a full scan.
//!
//! `UPDATE ... WHERE id = ?` on an absent id affects zero rows and is
//! accepted as a no-op, matching what the HTTP API promises its clients.

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::types::{check_persisted, from_epoch_millis};
use super::{BackendKind, FeedRecord, FeedRecordUpdate, FeedStore, StorageError, StorageResult};

/// SQLite-backed relational feed store
pub struct SqlStore {
    /// std::sync::Mutex because rusqlite connections are not Sync; never held across an await
    conn: Mutex<Connection>,
}

impl SqlStore {
    /// Create or open the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!("cannot create {:?}: {}", parent, e))
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(unavailable)?;

        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(unavailable)?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory().map_err(unavailable)?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS feeds (
                id TEXT PRIMARY KEY,
                time INTEGER NOT NULL,
                amount INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_feeds_time ON feeds(time DESC);
            ",
        )
        .map_err(unavailable)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sql connection lock poisoned".to_string()))
    }
}

fn unavailable(err: rusqlite::Error) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

fn write_failed(err: rusqlite::Error) -> StorageError {
    StorageError::WriteFailed(err.to_string())
}

/// Raw column values, validated after the row callback returns
struct FeedRow {
    id: String,
    time: i64,
    amount: i64,
}

impl FeedRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            time: row.get(1)?,
            amount: row.get(2)?,
        })
    }

    fn into_record(self) -> StorageResult<FeedRecord> {
        let time = from_epoch_millis(self.time).ok_or_else(|| {
            StorageError::CorruptData(format!("feed {} has invalid time {}", self.id, self.time))
        })?;
        let amount = u32::try_from(self.amount).map_err(|_| {
            StorageError::CorruptData(format!("feed {} has invalid amount {}", self.id, self.amount))
        })?;

        let record = FeedRecord::with_id(self.id, time, amount);
        check_persisted(&record).map_err(StorageError::CorruptData)?;
        Ok(record)
    }
}

#[async_trait]
impl FeedStore for SqlStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Sql
    }

    async fn get_all(&self) -> StorageResult<Vec<FeedRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached("SELECT id, time, amount FROM feeds ORDER BY time DESC")
            .map_err(unavailable)?;
        let rows = stmt.query_map([], FeedRow::from_row).map_err(unavailable)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(unavailable)?.into_record()?);
        }
        Ok(records)
    }

    async fn add(&self, record: FeedRecord) -> StorageResult<FeedRecord> {
        self.conn()?
            .execute(
                "INSERT INTO feeds (id, time, amount) VALUES (?1, ?2, ?3)",
                params![record.id, record.time_millis(), record.amount],
            )
            .map_err(write_failed)?;
        Ok(record)
    }

    async fn update(&self, id: &str, updates: &FeedRecordUpdate) -> StorageResult<()> {
        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(time) = updates.time {
            sets.push("time = ?");
            values.push(Value::Integer(time.timestamp_millis()));
        }
        if let Some(amount) = updates.amount {
            sets.push("amount = ?");
            values.push(Value::Integer(i64::from(amount)));
        }

        if sets.is_empty() {
            return Ok(());
        }
        values.push(Value::Text(id.to_string()));

        let sql = format!("UPDATE feeds SET {} WHERE id = ?", sets.join(", "));
        let changed = self
            .conn()?
            .execute(&sql, params_from_iter(values))
            .map_err(write_failed)?;

        if changed == 0 {
            tracing::debug!(feed_id = %id, "Update matched no rows");
        }
        Ok(())
    }

    async fn get_latest(&self) -> StorageResult<Option<FeedRecord>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, time, amount FROM feeds ORDER BY time DESC LIMIT 1",
                [],
                FeedRow::from_row,
            )
            .optional()
            .map_err(unavailable)?;

        row.map(FeedRow::into_record).transpose()
    }

    async fn reset(&self) -> StorageResult<()> {
        self.conn()?
            .execute("DELETE FROM feeds", [])
            .map_err(write_failed)?;
        Ok(())
    }
}
