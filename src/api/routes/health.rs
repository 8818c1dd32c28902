//! Health Routes
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health - Backend reachability, uptime, version

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
///
/// Reports `degraded` with 503 when the store cannot be read.
pub async fn full_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = match state.store.get_latest().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(backend = %state.store.backend(), error = %e, "Health check failed");
            false
        }
    };

    let (code, status) = if store_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            backend: state.store.backend().to_string(),
            store: if store_ok { "ok" } else { "error" }.to_string(),
            uptime_seconds: state.uptime_seconds(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
