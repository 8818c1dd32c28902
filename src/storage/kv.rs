//! Embedded transactional key-value store
//!
//! One SQLite table used purely as a key → value map: the key is the record
//! id, the value is the record serialized as JSON with an RFC 3339 `time`.
//! Updates run inside a transaction so the read, merge and write happen as
//! one unit, and absent keys are reported as `RecordNotFound`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::types::{check_persisted, iso8601};
use super::{BackendKind, FeedRecord, FeedRecordUpdate, FeedStore, StorageError, StorageResult};

/// Value shape stored under each key
#[derive(Debug, Serialize, Deserialize)]
struct KvValue {
    id: String,
    #[serde(with = "iso8601")]
    time: DateTime<Utc>,
    amount: u32,
}

impl From<&FeedRecord> for KvValue {
    fn from(record: &FeedRecord) -> Self {
        Self {
            id: record.id.clone(),
            time: record.time,
            amount: record.amount,
        }
    }
}

impl From<KvValue> for FeedRecord {
    fn from(value: KvValue) -> Self {
        FeedRecord::with_id(value.id, value.time, value.amount)
    }
}

/// SQLite-backed key-value feed store
pub struct KvStore {
    /// std::sync::Mutex because rusqlite connections are not Sync; never held across an await
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl KvStore {
    /// Create or open the key-value database at `path`
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!("cannot create {:?}: {}", parent, e))
            })?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(unavailable)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            CREATE TABLE IF NOT EXISTS feed_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .map_err(unavailable)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("kv connection lock poisoned".to_string()))
    }
}

fn unavailable(err: rusqlite::Error) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

fn write_failed(err: rusqlite::Error) -> StorageError {
    StorageError::WriteFailed(err.to_string())
}

fn decode(key: &str, raw: &str) -> StorageResult<FeedRecord> {
    let value: KvValue = serde_json::from_str(raw)
        .map_err(|e| StorageError::CorruptData(format!("key {}: {}", key, e)))?;
    let record = FeedRecord::from(value);
    check_persisted(&record).map_err(StorageError::CorruptData)?;
    Ok(record)
}

fn encode(record: &FeedRecord) -> StorageResult<String> {
    serde_json::to_string(&KvValue::from(record))
        .map_err(|e| StorageError::WriteFailed(e.to_string()))
}

#[async_trait]
impl FeedStore for KvStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Kv
    }

    async fn get_all(&self) -> StorageResult<Vec<FeedRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached("SELECT key, value FROM feed_kv")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(unavailable)?;

        let mut records = Vec::new();
        for row in rows {
            let (key, raw) = row.map_err(unavailable)?;
            records.push(decode(&key, &raw)?);
        }
        Ok(records)
    }

    async fn add(&self, record: FeedRecord) -> StorageResult<FeedRecord> {
        let value = encode(&record)?;
        self.conn()?
            .execute(
                "INSERT INTO feed_kv (key, value) VALUES (?1, ?2)",
                params![record.id, value],
            )
            .map_err(write_failed)?;
        Ok(record)
    }

    async fn update(&self, id: &str, updates: &FeedRecordUpdate) -> StorageResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(write_failed)?;

        let raw: Option<String> = tx
            .query_row(
                "SELECT value FROM feed_kv WHERE key = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(unavailable)?;
        let raw = raw.ok_or_else(|| StorageError::RecordNotFound(id.to_string()))?;

        let mut record = decode(id, &raw)?;
        updates.apply_to(&mut record);

        tx.execute(
            "UPDATE feed_kv SET value = ?1 WHERE key = ?2",
            params![encode(&record)?, id],
        )
        .map_err(write_failed)?;
        tx.commit().map_err(write_failed)?;
        Ok(())
    }

    async fn reset(&self) -> StorageResult<()> {
        self.conn()?
            .execute("DELETE FROM feed_kv", [])
            .map_err(write_failed)?;
        Ok(())
    }
}
