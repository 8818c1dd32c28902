//! Remote HTTP feed store
//!
//! Talks to a `feedtrack-api` server (or anything speaking the same JSON
//! contract). The base URL points at the API prefix, e.g.
//! `http://localhost:8787/api`.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use super::{BackendKind, FeedRecord, FeedRecordUpdate, FeedStore, StorageError, StorageResult};

/// Feed store backed by the HTTP feed API
pub struct HttpStore {
    client: Client,
    base_url: String,
}

impl HttpStore {
    /// Create a client for the API under `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Use an existing client (shared connection pool)
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// The API prefix requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn feeds_url(&self) -> String {
        format!("{}/feeds", self.base_url)
    }

    /// `/feeds/<id>` with `id` escaped as a single path segment
    fn feed_url(&self, id: &str) -> StorageResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.feeds_url())
            .map_err(|e| StorageError::Config(format!("invalid feed API url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Config(format!("feed API url cannot take a path: {}", self.base_url)))?
            .push(id);
        Ok(url)
    }
}

fn request_error(err: reqwest::Error) -> StorageError {
    if err.is_timeout() {
        StorageError::Unavailable("feed API timed out".to_string())
    } else if err.is_connect() {
        StorageError::Unavailable(format!("cannot reach feed API: {}", err))
    } else {
        StorageError::Unavailable(err.to_string())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> StorageResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| StorageError::CorruptData(format!("unreadable feed API response: {}", e)))
}

async fn ensure_written(response: Response, what: &str) -> StorageResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::WriteFailed(format!(
        "{} returned {}: {}",
        what, status, body
    )))
}

#[async_trait]
impl FeedStore for HttpStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Http
    }

    async fn get_all(&self) -> StorageResult<Vec<FeedRecord>> {
        let response = self
            .client
            .get(self.feeds_url())
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(StorageError::Unavailable(format!(
                "GET /feeds returned {}",
                response.status()
            )));
        }
        decode(response).await
    }

    async fn add(&self, record: FeedRecord) -> StorageResult<FeedRecord> {
        let response = self
            .client
            .post(self.feeds_url())
            .json(&record)
            .send()
            .await
            .map_err(request_error)?;

        ensure_written(response, "POST /feeds").await?;
        Ok(record)
    }

    async fn update(&self, id: &str, updates: &FeedRecordUpdate) -> StorageResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(self.feed_url(id)?)
            .json(updates)
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::RecordNotFound(id.to_string()));
        }
        ensure_written(response, "PUT /feeds/{id}").await
    }

    async fn get_latest(&self) -> StorageResult<Option<FeedRecord>> {
        let response = self
            .client
            .get(format!("{}/latest", self.feeds_url()))
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(StorageError::Unavailable(format!(
                "GET /feeds/latest returned {}",
                response.status()
            )));
        }
        decode(response).await
    }

    async fn reset(&self) -> StorageResult<()> {
        let response = self
            .client
            .delete(self.feeds_url())
            .send()
            .await
            .map_err(request_error)?;

        ensure_written(response, "DELETE /feeds").await
    }
}
