//! Feed Record Store
//!
//! Durable CRUD over [`FeedRecord`] behind one contract, [`FeedStore`], with a
//! concrete implementation per backend:
//!
//! - **memory**: in-process keyed table
//! - **blob**: one JSON file holding the whole array
//! - **kv**: embedded transactional key-value table (SQLite)
//! - **sql**: relational `feeds` table (SQLite)
//! - **http**: remote feed API
//!
//! The backend is chosen once, at composition time, by [`open_store`].
//!
//! # Time on the wire
//!
//! ```text
//! memory  native DateTime<Utc>
//! blob    epoch ms in JSON
//! kv      RFC 3339 string in JSON
//! sql     INTEGER epoch ms column
//! http    epoch ms in JSON
//! ```
//!
//! Whatever the form, a record read back equals the record written in `id`,
//! `amount`, and `time` to the millisecond.
//!
//! # Example
//!
//! ```rust,no_run
//! use feedtrack::storage::{FeedRecord, FeedStore, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     store.add(FeedRecord::new(120)).await?;
//!
//!     let latest = store.get_latest().await?;
//!     println!("last feed: {:?}", latest);
//!     Ok(())
//! }
//! ```

pub mod blob;
pub mod error;
pub mod http;
pub mod kv;
pub mod memory;
pub mod sql;
pub mod types;

pub use blob::BlobStore;
pub use error::{StorageError, StorageResult};
pub use http::HttpStore;
pub use kv::KvStore;
pub use memory::MemoryStore;
pub use sql::SqlStore;
pub use types::{
    from_epoch_millis, generate_id, sort_newest_first, truncate_millis, BackendKind, FeedRecord,
    FeedRecordUpdate,
};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::StorageConfig;

/// Common contract for every feed backend
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Which implementation this is
    fn backend(&self) -> BackendKind;

    /// Every stored record, in no particular order
    async fn get_all(&self) -> StorageResult<Vec<FeedRecord>>;

    /// Persist one new record. Id uniqueness is the caller's job.
    async fn add(&self, record: FeedRecord) -> StorageResult<FeedRecord>;

    /// Apply a partial update. An empty update must not touch the backend.
    async fn update(&self, id: &str, updates: &FeedRecordUpdate) -> StorageResult<()>;

    /// The record with the greatest `time`, if any
    async fn get_latest(&self) -> StorageResult<Option<FeedRecord>> {
        let records = self.get_all().await?;
        Ok(records.into_iter().max_by_key(|r| r.time))
    }

    /// Destroy all records
    async fn reset(&self) -> StorageResult<()>;
}

/// Open the backend named by the storage configuration
pub fn open_store(config: &StorageConfig) -> StorageResult<Arc<dyn FeedStore>> {
    let store: Arc<dyn FeedStore> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::Blob => Arc::new(BlobStore::open(config.blob_path())?),
        BackendKind::Kv => Arc::new(KvStore::open(config.kv_path())?),
        BackendKind::Sql => Arc::new(SqlStore::open(config.sql_path())?),
        BackendKind::Http => {
            let url = config.remote_url.as_deref().ok_or_else(|| {
                StorageError::Config("http backend requires storage.remote_url".to_string())
            })?;
            Arc::new(HttpStore::new(
                url,
                Duration::from_secs(config.request_timeout_secs),
            )?)
        }
    };

    tracing::info!(backend = %store.backend(), "Feed store opened");
    Ok(store)
}
