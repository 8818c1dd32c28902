//! # Feedtrack
//!
//! Infant feeding tracker: records each feed (time and volume), counts down
//! to the next expected feed, and keeps the log in one of several
//! interchangeable stores.
//!
//! ## Features
//!
//! - **Pluggable storage**: memory, JSON file, SQLite key-value, SQLite table,
//!   or a remote server, all behind one [`storage::FeedStore`] trait
//! - **Timers**: time since the last feed and countdown to the next, with
//!   warning and danger thresholds
//! - **Views**: daily totals and a recent-feeds timeline
//! - **Self-healing sessions**: an unreadable log is reset and reseeded once
//! - **HTTP API**: the same store served over REST
//!
//! ## Modules
//!
//! - [`storage`]: Record model and store backends
//! - [`timing`]: Pure derivations over a record set
//! - [`session`]: Working set and write path for one user session
//! - [`transfer`]: Snapshot export and import
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feedtrack::session::FeedSession;
//! use feedtrack::storage::SqlStore;
//! use feedtrack::timing::{format_hms, Schedule};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqlStore::open("feeds.db")?);
//!     let session = FeedSession::open(store, Schedule::default()).await?;
//!
//!     session.add_feed(120, None).await?;
//!
//!     let status = session.feed_status(chrono::Utc::now());
//!     if let Some(next) = status.next {
//!         println!("Next feed in {}", format_hms(next.remaining));
//!     }
//!
//!     session.close();
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod logging;
pub mod session;
pub mod storage;
pub mod timing;
pub mod transfer;

pub use config::Config;
pub use session::{FeedSession, SessionError, SessionStatus};
pub use storage::{open_store, BackendKind, FeedRecord, FeedRecordUpdate, FeedStore, StorageError};
