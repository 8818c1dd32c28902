//! Feed REST API
//!
//! HTTP front for any [`FeedStore`](crate::storage::FeedStore), built with
//! Axum. It is also what the `http` backend talks to.
//!
//! # Endpoints
//!
//! ## Feeds
//! - `GET /api/feeds` - All records, newest first
//! - `POST /api/feeds` - Create a record
//! - `PUT /api/feeds/:id` - Partial update
//! - `DELETE /api/feeds` - Remove every record
//! - `GET /api/feeds/latest` - Newest record or `null`
//!
//! ## Snapshots
//! - `GET /api/feeds/export` - Download the full log
//! - `POST /api/feeds/import` - Merge a JSON snapshot
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,no_run
//! use feedtrack::api::{serve, ApiConfig, AppState};
//! use feedtrack::storage::SqlStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqlStore::open("feeds.db")?);
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(store, config.clone());
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    extract::DefaultBodyLimit,
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use dto::NotFoundResponse;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_size;

    let api_routes = Router::new()
        .route(
            "/feeds",
            get(routes::feeds::list_feeds)
                .post(routes::feeds::create_feed)
                .delete(routes::feeds::reset_feeds),
        )
        .route("/feeds/latest", get(routes::feeds::latest_feed))
        .route("/feeds/export", get(routes::export::export_feeds))
        .route("/feeds/import", post(routes::export::import_feeds))
        .route("/feeds/:id", put(routes::feeds::update_feed))
        .layer(DefaultBodyLimit::max(body_limit));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health_routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            error: "Not Found".to_string(),
            message: format!("No route for {}", uri.path()),
        }),
    )
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Feed API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Feed API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FeedRecord, FeedStore, MemoryStore, SqlStore};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn ten_am() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn create_test_app(store: Arc<dyn FeedStore>) -> Router {
        build_router(AppState::new(store, ApiConfig::default()))
    }

    fn seeded_memory() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_records(vec![
            FeedRecord::with_id("a", ten_am(), 120),
            FeedRecord::with_id("a2", ten_am() - chrono::Duration::hours(1), 90),
        ]))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app(Arc::new(MemoryStore::new()));
        let (status, _) = send(app, "GET", "/health/live", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let app = create_test_app(Arc::new(MemoryStore::new()));
        let (status, body) = send(app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["backend"], "memory");
        assert_eq!(body["store"], "ok");
    }

    #[tokio::test]
    async fn test_list_sorted_newest_first() {
        let app = create_test_app(seeded_memory());
        let (status, body) = send(app, "GET", "/api/feeds", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "a");
        assert_eq!(body[0]["time"], ten_am().timestamp_millis());
        assert_eq!(body[1]["id"], "a2");
    }

    #[tokio::test]
    async fn test_create_returns_record() {
        let store = Arc::new(MemoryStore::new());
        let app = create_test_app(store.clone());

        let (status, body) = send(
            app,
            "POST",
            "/api/feeds",
            Some(json!({"id": "f1", "time": "2024-05-01T10:00:00Z", "amount": 120})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], "f1");
        assert_eq!(body["time"], ten_am().timestamp_millis());
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_generates_missing_id() {
        let app = create_test_app(Arc::new(MemoryStore::new()));
        let (status, body) = send(app, "POST", "/api/feeds", Some(json!({"amount": 60}))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert!(!body["id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_payloads() {
        let store = Arc::new(MemoryStore::new());
        for payload in [
            json!({"id": "x", "time": 1, "amount": 0}),
            json!({"id": "x", "time": 1, "amount": -20}),
            json!({"id": "x", "time": 1, "amount": "lots"}),
            json!({"id": "", "time": 1, "amount": 20}),
            json!({"id": "x", "time": 1}),
            json!({"id": "x", "time": (Utc::now() + chrono::Duration::days(2)).timestamp_millis(), "amount": 20}),
        ] {
            let app = create_test_app(store.clone());
            let (status, body) = send(app, "POST", "/api/feeds", Some(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({"error": "Invalid feed payload"}));
        }
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_json() {
        let app = create_test_app(Arc::new(MemoryStore::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/feeds")
                    .header("Content-Type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_amount_keeps_time() {
        let store = seeded_memory();
        let app = create_test_app(store.clone());

        let (status, body) = send(app, "PUT", "/api/feeds/a", Some(json!({"amount": 150}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));
        let latest = store.get_latest().await.unwrap().unwrap();
        assert_eq!(latest.amount, 150);
        assert_eq!(latest.time, ten_am());
    }

    #[tokio::test]
    async fn test_update_unknown_id_on_detecting_backend() {
        let app = create_test_app(seeded_memory());
        let (status, body) = send(app, "PUT", "/api/feeds/nope", Some(json!({"amount": 10}))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Feed not found"}));
    }

    #[tokio::test]
    async fn test_update_unknown_id_on_sql_is_noop() {
        let store = Arc::new(SqlStore::open_in_memory().unwrap());
        let app = create_test_app(store);
        let (status, _) = send(app, "PUT", "/api/feeds/nope", Some(json!({"amount": 10}))).await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_update_empty_body_is_success() {
        let app = create_test_app(seeded_memory());
        let (status, _) = send(app, "PUT", "/api/feeds/nope", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_update_rejects_zero_amount() {
        let app = create_test_app(seeded_memory());
        let (status, _) = send(app, "PUT", "/api/feeds/a", Some(json!({"amount": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_latest_and_reset() {
        let store = seeded_memory();

        let (_, latest) = send(create_test_app(store.clone()), "GET", "/api/feeds/latest", None).await;
        assert_eq!(latest["id"], "a");

        let (status, _) = send(create_test_app(store.clone()), "DELETE", "/api/feeds", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, latest) = send(create_test_app(store.clone()), "GET", "/api/feeds/latest", None).await;
        assert_eq!(latest, Value::Null);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_has_attachment() {
        let app = create_test_app(seeded_memory());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/feeds/export")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()["content-disposition"].to_str().unwrap();
        assert!(disposition.starts_with("attachment"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_import_merges_and_rejects() {
        let store = seeded_memory();

        let (status, body) = send(
            create_test_app(store.clone()),
            "POST",
            "/api/feeds/import",
            Some(json!([
                {"id": "a", "time": 1714557600000_i64, "amount": 120},
                {"id": "b", "time": "2024-05-01T11:00:00Z", "amount": 80}
            ])),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"imported": 1, "skipped": 1}));

        let (status, _) = send(
            create_test_app(store.clone()),
            "POST",
            "/api/feeds/import",
            Some(json!([{"id": "c", "time": 1714557600000_i64}])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.get_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = create_test_app(Arc::new(MemoryStore::new()));
        let (status, body) = send(app, "GET", "/api/nothing", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");
        assert!(body["message"].as_str().unwrap().contains("/api/nothing"));
    }
}
