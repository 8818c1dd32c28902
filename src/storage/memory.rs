//! In-process keyed table
//!
//! Records live in a `HashMap` keyed by id. Nothing survives the process,
//! which makes this the backend of choice for tests and throwaway sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{BackendKind, FeedRecord, FeedRecordUpdate, FeedStore, StorageError, StorageResult};

/// Volatile feed store keyed by record id
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, FeedRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = FeedRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get_all(&self) -> StorageResult<Vec<FeedRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn add(&self, record: FeedRecord) -> StorageResult<FeedRecord> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, updates: &FeedRecordUpdate) -> StorageResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))?;
        updates.apply_to(record);
        Ok(())
    }

    async fn reset(&self) -> StorageResult<()> {
        self.records.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{assert_contract, sample};

    #[tokio::test]
    async fn test_memory_contract() {
        assert_contract(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let store = MemoryStore::with_records([sample("a", 10, 120)]);
        let err = store
            .update("missing", &FeedRecordUpdate::new().amount(90))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_update_skips_lookup() {
        let store = MemoryStore::new();
        // No fields set: must succeed without touching the table
        store.update("missing", &FeedRecordUpdate::new()).await.unwrap();
    }
}
