//! Feed Routes
//!
//! - GET /api/feeds - All records, newest first
//! - POST /api/feeds - Create a record
//! - PUT /api/feeds/:id - Partial update
//! - DELETE /api/feeds - Remove every record
//! - GET /api/feeds/latest - Newest record or `null`

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::{CreateFeedRequest, SuccessResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::session::{validate_amount, validate_time, validate_update};
use crate::storage::{
    generate_id, sort_newest_first, truncate_millis, FeedRecord, FeedRecordUpdate, StorageError,
};

const INVALID_PAYLOAD: &str = "Invalid feed payload";

/// GET /api/feeds
pub async fn list_feeds(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<FeedRecord>>> {
    let mut records = state
        .store
        .get_all()
        .await
        .map_err(ApiError::storage("Failed to fetch feeds"))?;
    sort_newest_first(&mut records);
    Ok(Json(records))
}

/// GET /api/feeds/latest
pub async fn latest_feed(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Option<FeedRecord>>> {
    let latest = state
        .store
        .get_latest()
        .await
        .map_err(ApiError::storage("Failed to fetch feeds"))?;
    Ok(Json(latest))
}

/// POST /api/feeds
pub async fn create_feed(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateFeedRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FeedRecord>)> {
    let Json(req) = payload.map_err(invalid_payload)?;

    let amount = validate_amount(req.amount).map_err(|_| bad_request())?;
    let id = match req.id {
        Some(id) if id.trim().is_empty() => return Err(bad_request()),
        Some(id) => id,
        None => generate_id(),
    };
    let now = Utc::now();
    let time = validate_time(req.time.unwrap_or(now), now).map_err(|_| bad_request())?;
    let time = truncate_millis(time);

    let record = state
        .store
        .add(FeedRecord::with_id(id, time, amount))
        .await
        .map_err(ApiError::storage("Failed to create feed"))?;

    tracing::info!(feed_id = %record.id, amount = record.amount, "Created feed");

    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/feeds/:id
///
/// Backends that cannot tell an absent id apart answer 200 for it.
pub async fn update_feed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<FeedRecordUpdate>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse>> {
    let Json(updates) = payload.map_err(invalid_payload)?;
    validate_update(&updates, Utc::now()).map_err(|_| bad_request())?;

    if updates.is_empty() {
        return Ok(Json(SuccessResponse::ok()));
    }

    match state.store.update(&id, &updates).await {
        Ok(()) => {
            tracing::info!(feed_id = %id, "Updated feed");
            Ok(Json(SuccessResponse::ok()))
        }
        Err(StorageError::RecordNotFound(_)) => Err(ApiError::NotFound("Feed not found".into())),
        Err(e) => Err(ApiError::storage("Failed to update feed")(e)),
    }
}

/// DELETE /api/feeds
pub async fn reset_feeds(State(state): State<Arc<AppState>>) -> ApiResult<Json<SuccessResponse>> {
    state
        .store
        .reset()
        .await
        .map_err(ApiError::storage("Failed to reset feeds"))?;

    tracing::warn!(backend = %state.store.backend(), "All feeds removed");

    Ok(Json(SuccessResponse::ok()))
}

fn bad_request() -> ApiError {
    ApiError::BadRequest(INVALID_PAYLOAD.to_string())
}

fn invalid_payload(rejection: JsonRejection) -> ApiError {
    tracing::debug!(reason = %rejection.body_text(), "Rejected feed payload");
    bad_request()
}
