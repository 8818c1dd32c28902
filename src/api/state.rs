//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ApiSection;
use crate::storage::FeedStore;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Backend the API serves records from
    pub store: Arc<dyn FeedStore>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn FeedStore>, config: ApiConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size in bytes (applies to imports)
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            max_body_size: 5 * 1024 * 1024, // 5MB
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&ApiSection> for ApiConfig {
    fn from(section: &ApiSection) -> Self {
        Self::new(section.host.clone(), section.port)
    }
}
