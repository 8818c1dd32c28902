//! Feed Session Controller
//!
//! Owns the in-memory working set for one user session and keeps it in step
//! with a [`FeedStore`]. Observers read a [`SessionSnapshot`] or subscribe to
//! a watch channel; every successful write republishes the snapshot.
//!
//! ## Write path
//!
//! ```text
//! validate ──> lock ──> store write ──ok──> publish
//!                            └──err──> SessionError (working set untouched)
//! ```
//!
//! All writes and loads are serialized through one async lock. A load that
//! has been superseded by a newer load, or by [`FeedSession::close`], drops
//! its result instead of publishing it.

pub mod state;
pub mod validation;

pub use state::{SessionSnapshot, SessionStatus};
pub use validation::{parse_amount, validate_amount, validate_time, validate_update, ValidationError};

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::storage::{sort_newest_first, FeedRecord, FeedRecordUpdate, FeedStore, StorageError};
use crate::timing::{FeedStatus, Schedule};

/// Shown once after the store had to be wiped during recovery
pub const DATA_LOSS_WARNING: &str =
    "Saved feed history could not be read and was reset. Previous entries have been lost.";

const LOAD_FAILED: &str = "Could not load feed history";
const RECOVERY_FAILED: &str = "Could not recover feed history. Please restart the app.";
const RESEED_FAILED: &str = "Feed history was cleared but could not be restarted";

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session is closed")]
    Closed,

    #[error("Load superseded by a newer request")]
    Superseded,
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Working set of feed records for one session
pub struct FeedSession {
    store: Arc<dyn FeedStore>,
    schedule: Schedule,
    published: watch::Sender<SessionSnapshot>,
    write_lock: Mutex<()>,
    generation: AtomicU64,
    first_load_done: AtomicBool,
    closed: AtomicBool,
    warning: std::sync::Mutex<Option<String>>,
}

impl FeedSession {
    /// Create an unloaded session; call [`FeedSession::load`] next
    pub fn new(store: Arc<dyn FeedStore>, schedule: Schedule) -> Self {
        let (published, _) = watch::channel(SessionSnapshot::loading());
        Self {
            store,
            schedule,
            published,
            write_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            first_load_done: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            warning: std::sync::Mutex::new(None),
        }
    }

    /// Create and load in one step
    pub async fn open(store: Arc<dyn FeedStore>, schedule: Schedule) -> SessionResult<Self> {
        let session = Self::new(store, schedule);
        session.load().await?;
        Ok(session)
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn store(&self) -> &Arc<dyn FeedStore> {
        &self.store
    }

    /// Fetch the full log, seeding an empty store with one default record.
    ///
    /// If the very first load fails, the store is reset and reseeded once;
    /// success then leaves a one-time warning for [`FeedSession::take_warning`].
    /// Later load failures only move the session to `Error`.
    pub async fn load(&self) -> SessionResult<()> {
        self.ensure_open()?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let _guard = self.write_lock.lock().await;
        if self.is_stale(generation) {
            return Err(SessionError::Superseded);
        }

        self.publish_status(SessionStatus::Loading);
        let initial = !self.first_load_done.load(Ordering::SeqCst);
        let result = self.fetch_or_seed().await;

        // Only a load that gets to report counts as the first one
        if self.is_stale(generation) {
            debug!(generation, "Discarding superseded load");
            return Err(SessionError::Superseded);
        }
        self.first_load_done.store(true, Ordering::SeqCst);

        match result {
            Ok(records) => {
                info!(count = records.len(), "Feed history loaded");
                self.publish(SessionStatus::Ready, records);
                Ok(())
            }
            Err(e) if initial => {
                error!(error = %e, "Initial load failed, attempting recovery");
                self.publish_status(SessionStatus::Error(LOAD_FAILED.to_string()));
                self.recover(generation).await
            }
            Err(e) => {
                error!(error = %e, "Load failed");
                self.publish_status(SessionStatus::Error(LOAD_FAILED.to_string()));
                Err(e.into())
            }
        }
    }

    /// Record a feed at `time`, or now when `None`
    pub async fn add_feed(&self, amount: i64, time: Option<DateTime<Utc>>) -> SessionResult<FeedRecord> {
        let now = Utc::now();
        let amount = validate_amount(amount)?;
        let time = validate_time(time.unwrap_or(now), now)?;
        self.ensure_open()?;

        let _guard = self.write_lock.lock().await;
        self.ensure_open()?;

        let record = self.store.add(FeedRecord::at(amount, time)).await?;
        info!(feed_id = %record.id, amount = record.amount, "Feed recorded");

        if !self.closed.load(Ordering::SeqCst) {
            let inserted = record.clone();
            self.published.send_modify(|snapshot| {
                snapshot.records.push(inserted);
                sort_newest_first(&mut snapshot.records);
            });
        }

        Ok(record)
    }

    /// Apply a partial update to one record
    pub async fn update_feed(&self, id: &str, updates: FeedRecordUpdate) -> SessionResult<()> {
        validate_update(&updates, Utc::now())?;
        self.ensure_open()?;
        if updates.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        self.ensure_open()?;

        self.store.update(id, &updates).await?;
        debug!(feed_id = %id, "Feed updated");

        if !self.closed.load(Ordering::SeqCst) {
            self.published.send_modify(|snapshot| {
                if let Some(record) = snapshot.records.iter_mut().find(|r| r.id == id) {
                    updates.apply_to(record);
                }
                sort_newest_first(&mut snapshot.records);
            });
        }

        Ok(())
    }

    /// Wipe the store and start over from a single default record
    pub async fn reset(&self) -> SessionResult<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock().await;
        self.ensure_open()?;

        self.store.reset().await?;
        let seed = match self.seed().await {
            Ok(seed) => seed,
            Err(e) => {
                // The store is empty now; the old working set must not stay visible
                error!(error = %e, "Reseed after reset failed");
                if !self.closed.load(Ordering::SeqCst) {
                    self.publish(SessionStatus::Error(RESEED_FAILED.to_string()), Vec::new());
                }
                return Err(e.into());
            }
        };
        warn!(backend = %self.store.backend(), "Feed history reset");

        if !self.closed.load(Ordering::SeqCst) {
            self.publish(SessionStatus::Ready, vec![seed]);
        }
        Ok(())
    }

    /// Stop publishing; in-flight loads are discarded
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!("Session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current working set, newest first
    pub fn records(&self) -> Vec<FeedRecord> {
        self.published.borrow().records.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.published.borrow().status.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.published.borrow().clone()
    }

    /// Receiver that wakes on every publish
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.published.subscribe()
    }

    /// Timer state for `now`
    pub fn feed_status(&self, now: DateTime<Utc>) -> FeedStatus {
        FeedStatus::compute(&self.published.borrow().records, now, &self.schedule)
    }

    /// Pending data-loss warning; returns `Some` at most once
    pub fn take_warning(&self) -> Option<String> {
        self.warning.lock().ok().and_then(|mut slot| slot.take())
    }

    async fn recover(&self, generation: u64) -> SessionResult<()> {
        self.publish_status(SessionStatus::Recovering);

        let outcome = match self.store.reset().await {
            Ok(()) => self.seed().await,
            Err(e) => Err(e),
        };

        if self.is_stale(generation) {
            return Err(SessionError::Superseded);
        }

        match outcome {
            Ok(seed) => {
                warn!(backend = %self.store.backend(), "Store reset during recovery, history lost");
                if let Ok(mut slot) = self.warning.lock() {
                    *slot = Some(DATA_LOSS_WARNING.to_string());
                }
                self.publish(SessionStatus::Ready, vec![seed]);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Recovery failed");
                self.publish_status(SessionStatus::Error(RECOVERY_FAILED.to_string()));
                Err(e.into())
            }
        }
    }

    async fn fetch_or_seed(&self) -> Result<Vec<FeedRecord>, StorageError> {
        let mut records = self.store.get_all().await?;
        if records.is_empty() {
            let seed = self.seed().await?;
            return Ok(vec![seed]);
        }
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn seed(&self) -> Result<FeedRecord, StorageError> {
        let seed = self.store.add(FeedRecord::new(self.schedule.default_amount)).await?;
        info!(feed_id = %seed.id, amount = seed.amount, "Seeded empty feed log");
        Ok(seed)
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.closed.load(Ordering::SeqCst) || self.generation.load(Ordering::SeqCst) != generation
    }

    fn publish(&self, status: SessionStatus, records: Vec<FeedRecord>) {
        self.published.send_replace(SessionSnapshot { status, records });
    }

    fn publish_status(&self, status: SessionStatus) {
        self.published.send_modify(|snapshot| snapshot.status = status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BackendKind, MemoryStore, StorageResult};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::AtomicUsize;

    /// Store whose operations fail on demand
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        fail_resets: AtomicBool,
        hold_reads: AtomicBool,
        reads_started: AtomicUsize,
        resets: AtomicUsize,
    }

    #[async_trait]
    impl FeedStore for FailingStore {
        fn backend(&self) -> BackendKind {
            BackendKind::Memory
        }

        async fn get_all(&self) -> StorageResult<Vec<FeedRecord>> {
            self.reads_started.fetch_add(1, Ordering::SeqCst);
            while self.hold_reads.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::CorruptData("unreadable".into()));
            }
            self.inner.get_all().await
        }

        async fn add(&self, record: FeedRecord) -> StorageResult<FeedRecord> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::WriteFailed("disk full".into()));
            }
            self.inner.add(record).await
        }

        async fn update(&self, id: &str, updates: &FeedRecordUpdate) -> StorageResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::WriteFailed("disk full".into()));
            }
            self.inner.update(id, updates).await
        }

        async fn reset(&self) -> StorageResult<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            if self.fail_resets.load(Ordering::SeqCst) {
                return Err(StorageError::WriteFailed("locked".into()));
            }
            // A successful reset clears whatever made reads fail
            self.fail_reads.store(false, Ordering::SeqCst);
            self.inner.reset().await
        }
    }

    fn memory_session() -> (Arc<MemoryStore>, FeedSession) {
        let store = Arc::new(MemoryStore::new());
        let session = FeedSession::new(store.clone(), Schedule::default());
        (store, session)
    }

    #[tokio::test]
    async fn test_empty_store_is_seeded() {
        let (store, session) = memory_session();
        assert_eq!(session.status(), SessionStatus::Loading);

        session.load().await.unwrap();

        let records = session.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 120);
        assert_eq!(store.get_all().await.unwrap(), records);
        assert!(session.status().is_ready());
        assert!(session.take_warning().is_none());
    }

    #[tokio::test]
    async fn test_load_sorts_newest_first() {
        let base = Utc::now() - Duration::hours(5);
        let store = Arc::new(MemoryStore::with_records(vec![
            FeedRecord::with_id("old", base, 90),
            FeedRecord::with_id("new", base + Duration::hours(3), 110),
        ]));
        let session = FeedSession::open(store, Schedule::default()).await.unwrap();

        let ids: Vec<String> = session.records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_add_feed_becomes_latest() {
        let (_store, session) = memory_session();
        session.load().await.unwrap();

        let added = session.add_feed(150, None).await.unwrap();

        let records = session.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], added);
        assert_eq!(session.feed_status(Utc::now()).latest, Some(added));
    }

    #[tokio::test]
    async fn test_backdated_feed_sorts_below_latest() {
        let (_store, session) = memory_session();
        session.load().await.unwrap();

        let earlier = Utc::now() - Duration::hours(2);
        let added = session.add_feed(60, Some(earlier)).await.unwrap();

        let records = session.records();
        assert_eq!(records[1].id, added.id);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_store() {
        let (store, session) = memory_session();
        session.load().await.unwrap();

        let zero = session.add_feed(0, None).await;
        assert!(matches!(zero, Err(SessionError::Validation(ValidationError::InvalidAmount(0)))));

        let future = session.add_feed(90, Some(Utc::now() + Duration::hours(1))).await;
        assert!(matches!(future, Err(SessionError::Validation(ValidationError::FutureTime(_)))));

        assert_eq!(store.get_all().await.unwrap().len(), 1);
        assert_eq!(session.records().len(), 1);
    }

    #[tokio::test]
    async fn test_update_feed_resorts() {
        let (_store, session) = memory_session();
        session.load().await.unwrap();
        let seed_id = session.records()[0].id.clone();
        let older = session.add_feed(90, Some(Utc::now() - Duration::hours(3))).await.unwrap();

        session
            .update_feed(&older.id, FeedRecordUpdate::new().time(Utc::now() - Duration::minutes(1)))
            .await
            .unwrap();
        session
            .update_feed(&older.id, FeedRecordUpdate::new().amount(75))
            .await
            .unwrap();

        let records = session.records();
        assert_eq!(records.len(), 2);
        let moved = records.iter().find(|r| r.id == older.id).unwrap();
        assert_eq!(moved.amount, 75);
        assert!(records.iter().any(|r| r.id == seed_id));
        assert!(records[0].time >= records[1].time);
    }

    #[tokio::test]
    async fn test_update_unknown_id_leaves_working_set() {
        let (_store, session) = memory_session();
        session.load().await.unwrap();
        let before = session.records();

        let result = session.update_feed("missing", FeedRecordUpdate::new().amount(50)).await;

        assert!(matches!(result, Err(SessionError::Storage(StorageError::RecordNotFound(_)))));
        assert_eq!(session.records(), before);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_working_set() {
        let store = Arc::new(FailingStore::default());
        let session = FeedSession::open(store.clone(), Schedule::default()).await.unwrap();
        let before = session.snapshot();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(session.add_feed(100, None).await, Err(SessionError::Storage(_))));

        assert_eq!(session.snapshot(), before);
    }

    #[tokio::test]
    async fn test_initial_failure_recovers_once_with_warning() {
        let store = Arc::new(FailingStore::default());
        store.fail_reads.store(true, Ordering::SeqCst);
        let session = FeedSession::new(store.clone(), Schedule::default());

        session.load().await.unwrap();

        assert!(session.status().is_ready());
        assert_eq!(session.records().len(), 1);
        assert_eq!(store.resets.load(Ordering::SeqCst), 1);
        assert_eq!(session.take_warning().as_deref(), Some(DATA_LOSS_WARNING));
        assert!(session.take_warning().is_none());
    }

    #[tokio::test]
    async fn test_failed_recovery_ends_in_error() {
        let store = Arc::new(FailingStore::default());
        store.fail_reads.store(true, Ordering::SeqCst);
        store.fail_resets.store(true, Ordering::SeqCst);
        let session = FeedSession::new(store.clone(), Schedule::default());

        assert!(session.load().await.is_err());

        assert_eq!(session.status(), SessionStatus::Error(RECOVERY_FAILED.to_string()));
        assert_eq!(store.resets.load(Ordering::SeqCst), 1);
        assert!(session.take_warning().is_none());
    }

    #[tokio::test]
    async fn test_later_load_failure_does_not_reset() {
        let store = Arc::new(FailingStore::default());
        let session = FeedSession::open(store.clone(), Schedule::default()).await.unwrap();

        store.fail_reads.store(true, Ordering::SeqCst);
        assert!(session.load().await.is_err());

        assert!(session.status().is_error());
        assert_eq!(store.resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_reseeds() {
        let (store, session) = memory_session();
        session.load().await.unwrap();
        session.add_feed(100, None).await.unwrap();
        session.add_feed(110, None).await.unwrap();

        session.reset().await.unwrap();

        let records = session.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 120);
        assert_eq!(store.get_all().await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_failed_reseed_clears_working_set() {
        let store = Arc::new(FailingStore::default());
        let session = FeedSession::open(store.clone(), Schedule::default()).await.unwrap();
        session.add_feed(100, None).await.unwrap();
        assert_eq!(session.records().len(), 2);

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(session.reset().await, Err(SessionError::Storage(_))));

        assert!(session.records().is_empty());
        assert_eq!(session.status(), SessionStatus::Error(RESEED_FAILED.to_string()));
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_see_writes() {
        let (_store, session) = memory_session();
        let mut rx = session.subscribe();
        session.load().await.unwrap();
        rx.borrow_and_update();

        session.add_feed(130, None).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().records.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_operations() {
        let (_store, session) = memory_session();
        session.load().await.unwrap();
        let before = session.records();

        session.close();

        assert!(matches!(session.add_feed(100, None).await, Err(SessionError::Closed)));
        assert!(matches!(session.load().await, Err(SessionError::Closed)));
        assert!(matches!(session.reset().await, Err(SessionError::Closed)));
        assert_eq!(session.records(), before);
    }

    #[tokio::test]
    async fn test_superseded_load_is_discarded() {
        let (_store, session) = memory_session();
        let session = Arc::new(session);
        session.load().await.unwrap();

        // Hold the lock so the first reload queues, then start a newer one
        let guard = session.write_lock.lock().await;
        let first = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        tokio::task::yield_now().await;
        while session.generation.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        while session.generation.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }
        drop(guard);

        let outcomes = (first.await.unwrap(), second.await.unwrap());
        let superseded = [&outcomes.0, &outcomes.1]
            .iter()
            .filter(|r| matches!(r, Err(SessionError::Superseded)))
            .count();
        assert_eq!(superseded, 1);
        assert!(session.status().is_ready());
    }

    #[tokio::test]
    async fn test_superseded_first_load_still_recovers() {
        let store = Arc::new(FailingStore::default());
        store.fail_reads.store(true, Ordering::SeqCst);
        store.hold_reads.store(true, Ordering::SeqCst);
        let session = Arc::new(FeedSession::new(store.clone(), Schedule::default()));

        // First load is mid-fetch when a second one starts
        let first = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        while store.reads_started.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        while session.generation.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        store.hold_reads.store(false, Ordering::SeqCst);

        assert!(matches!(first.await.unwrap(), Err(SessionError::Superseded)));
        second.await.unwrap().unwrap();

        assert!(session.status().is_ready());
        assert_eq!(session.records().len(), 1);
        assert_eq!(store.resets.load(Ordering::SeqCst), 1);
        assert_eq!(session.take_warning().as_deref(), Some(DATA_LOSS_WARNING));
    }
}
