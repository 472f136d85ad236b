//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::LobError;

/// Request-scoped error for the image route
#[derive(Debug)]
pub enum ApiError {
    /// No connection available in time (503)
    PoolExhausted,

    /// Pool already closed, shutdown in progress (503)
    PoolClosed,

    /// Target row does not exist (404)
    NoData { row_id: i64 },

    /// Target row has a NULL payload (404)
    NullPayload { row_id: i64 },

    /// Lookup failed (500, logged)
    Database(LobError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::PoolExhausted => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "pool_exhausted",
                    "message": "no database connection available"
                }),
            ),
            Self::PoolClosed => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "shutting_down",
                    "message": "server is shutting down"
                }),
            ),
            Self::NoData { row_id } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("no row with id {}", row_id)
                }),
            ),
            Self::NullPayload { row_id } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("row {} has no image", row_id)
                }),
            ),
            Self::Database(e) => {
                // Log the actual error, return generic message
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "internal_error",
                        "message": "an internal error occurred"
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<LobError> for ApiError {
    fn from(e: LobError) -> Self {
        match e {
            LobError::PoolExhausted => Self::PoolExhausted,
            LobError::PoolClosed => Self::PoolClosed,
            other => Self::Database(other),
        }
    }
}
