//! Snapshot Routes
//!
//! Backup and restore of the full feed log.
//!
//! - GET /api/feeds/export - Download a snapshot (`?format=csv` for CSV)
//! - POST /api/feeds/import - Merge a JSON snapshot

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::ExportParams;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::transfer::{self, ExportFormat, ImportReport, TransferError};

/// GET /api/feeds/export
pub async fn export_feeds(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let format: ExportFormat = match params.format.as_deref() {
        Some(raw) => raw.parse().map_err(ApiError::BadRequest)?,
        None => ExportFormat::Json,
    };

    let records = state
        .store
        .get_all()
        .await
        .map_err(ApiError::storage("Failed to export feeds"))?;

    let body = transfer::export(&records, format).map_err(|e| {
        tracing::error!(error = %e, "Snapshot serialization failed");
        ApiError::Internal("Failed to export feeds".to_string())
    })?;

    let filename = format!(
        "feeds_export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    );

    tracing::info!(count = records.len(), format = format.extension(), "Exported feeds");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from(body),
    )
        .into_response())
}

/// POST /api/feeds/import
///
/// The body is validated as a whole before anything is written.
pub async fn import_feeds(
    State(state): State<Arc<AppState>>,
    body: String,
) -> ApiResult<Json<ImportReport>> {
    match transfer::import_json(state.store.as_ref(), &body).await {
        Ok(report) => Ok(Json(report)),
        Err(TransferError::Storage(e)) => Err(ApiError::storage("Failed to import feeds")(e)),
        Err(e @ (TransferError::Malformed { .. } | TransferError::Json(_))) => {
            Err(ApiError::BadRequest(e.to_string()))
        }
        Err(e) => {
            tracing::error!(error = %e, "Import failed");
            Err(ApiError::Internal("Failed to import feeds".to_string()))
        }
    }
}
