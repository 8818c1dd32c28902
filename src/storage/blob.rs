//! Single-blob JSON store
//!
//! The whole record set is one serialized array in one file, the way a
//! browser keeps it under a single local-storage key. Every mutation is a
//! read-modify-write of the full array.
//!
//! An update naming an absent id is a silent no-op: the blob has no index to
//! tell "missing" apart from "nothing to change".

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::types::check_persisted;
use super::{BackendKind, FeedRecord, FeedRecordUpdate, FeedStore, StorageError, StorageResult};

/// Feed store persisted as one JSON array on disk
#[derive(Debug)]
pub struct BlobStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within the process
    guard: Mutex<()>,
}

impl BlobStore {
    /// Open (or lazily create) the blob at `path`
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!("cannot create {:?}: {}", parent, e))
            })?;
        }

        Ok(Self {
            path,
            guard: Mutex::new(()),
        })
    }

    /// Location of the blob file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_blob(&self) -> StorageResult<Vec<FeedRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Unavailable(format!(
                    "cannot read {:?}: {}",
                    self.path, e
                )))
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let records: Vec<FeedRecord> = serde_json::from_slice(&bytes)?;
        for record in &records {
            check_persisted(record).map_err(StorageError::CorruptData)?;
        }
        Ok(records)
    }

    async fn write_blob(&self, records: &[FeedRecord]) -> StorageResult<()> {
        let json = serde_json::to_vec(records)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        // Write beside the target then rename so readers never see half a file
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("cannot write {:?}: {}", tmp, e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("cannot replace {:?}: {}", self.path, e)))?;
        Ok(())
    }
}

#[async_trait]
impl FeedStore for BlobStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Blob
    }

    async fn get_all(&self) -> StorageResult<Vec<FeedRecord>> {
        let _guard = self.guard.lock().await;
        self.read_blob().await
    }

    async fn add(&self, record: FeedRecord) -> StorageResult<FeedRecord> {
        let _guard = self.guard.lock().await;
        let mut records = self.read_blob().await?;
        records.push(record.clone());
        self.write_blob(&records).await?;
        Ok(record)
    }

    async fn update(&self, id: &str, updates: &FeedRecordUpdate) -> StorageResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let _guard = self.guard.lock().await;
        let mut records = self.read_blob().await?;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            tracing::debug!(feed_id = %id, "Update for absent id ignored by blob store");
            return Ok(());
        };
        updates.apply_to(record);
        self.write_blob(&records).await
    }

    async fn reset(&self) -> StorageResult<()> {
        let _guard = self.guard.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::WriteFailed(format!(
                "cannot remove {:?}: {}",
                self.path, e
            ))),
        }
    }
}
