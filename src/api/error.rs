//! API Error Types
//!
//! Every failure leaves the server as `{"error": "<reason>"}`. The reason is
//! fixed per operation; backend detail only goes to the log, tagged with the
//! request id that is also returned in the `x-request-id` header.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or invalid request
    #[error("{0}")]
    BadRequest(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Backend failure during a named operation
    #[error("{reason}: {source}")]
    Storage {
        reason: &'static str,
        #[source]
        source: StorageError,
    },

    /// Internal server error
    #[error("{0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Wrap a backend error with the reason reported to the client
    pub fn storage(reason: &'static str) -> impl FnOnce(StorageError) -> ApiError {
        move |source| ApiError::Storage { reason, source }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage { .. } | ApiError::Internal(_) | ApiError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn client_message(&self) -> String {
        match self {
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Internal(message) => message.clone(),
            ApiError::Storage { reason, .. } => reason.to_string(),
            ApiError::Io(_) => "Internal server error".to_string(),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                status = status.as_u16(),
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::debug!(
                request_id = %request_id,
                status = status.as_u16(),
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: self.client_message(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
