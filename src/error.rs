//! Error handling module
//!
//! Read API error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Route not found")]
    RouteNotFound,

    // Server errors (5xx)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            // 404 Not Found
            AppError::PostNotFound(_) => (StatusCode::NOT_FOUND, "Post not found", None),
            AppError::RouteNotFound => (StatusCode::NOT_FOUND, "Route not found", None),

            // 500 Internal Server Error
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    Some(e.to_string()),
                )
            }
        };

        let body = ErrorResponse {
            message: message.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
