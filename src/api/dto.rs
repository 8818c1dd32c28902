//! Data Transfer Objects
//!
//! Request and response bodies for the feed API. Records themselves go over
//! the wire as [`FeedRecord`](crate::storage::FeedRecord); partial updates as
//! [`FeedRecordUpdate`](crate::storage::FeedRecordUpdate).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::types::epoch_millis;

/// POST /api/feeds body
#[derive(Debug, Deserialize)]
pub struct CreateFeedRequest {
    /// Client-generated id; one is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Epoch ms or ISO-8601; now when absent
    #[serde(default, with = "epoch_millis::option")]
    pub time: Option<DateTime<Utc>>,
    /// Checked for positivity after parsing
    pub amount: i64,
}

/// Acknowledgement for writes that return no record
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// GET /api/feeds/export query
#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    /// `json` (default) or `csv`
    #[serde(default)]
    pub format: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub store: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// Fallback body for unknown routes
#[derive(Debug, Serialize)]
pub struct NotFoundResponse {
    pub error: String,
    pub message: String,
}
