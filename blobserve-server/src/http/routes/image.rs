//! Image endpoint - streams the configured payload as a JPEG

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use super::hint;
use crate::db::PayloadLookup;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::stream::{payload_stream, ScopedSession, TransferOptions};

pub const IMAGE_PATH: &str = "/getimage";

/// GET /getimage
///
/// Acquire a session, look the payload up, then hand the session to the
/// response body stream. Every early return releases the session first.
async fn get_image(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let target = state.payload.target.clone();

    let mut session = ScopedSession::acquire(state.store.as_ref())
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Could not acquire a pooled connection");
            ApiError::from(e)
        })?;

    let len = match session.lookup(&target).await {
        Ok(PayloadLookup::Present(len)) => len,
        Ok(PayloadLookup::Missing) => {
            tracing::warn!(row_id = target.row_id, "No data selected from table.");
            session.release().await;
            return Err(ApiError::NoData {
                row_id: target.row_id,
            });
        }
        Ok(PayloadLookup::Null) => {
            tracing::warn!(row_id = target.row_id, "BLOB was NULL");
            session.release().await;
            return Err(ApiError::NullPayload {
                row_id: target.row_id,
            });
        }
        Err(e) => {
            session.release().await;
            return Err(ApiError::from(e));
        }
    };

    tracing::debug!(row_id = target.row_id, bytes = len, "Streaming payload");

    let options = TransferOptions {
        chunk_size: state.payload.chunk_size,
        abort_trigger: state
            .abort_on_stream_error
            .then(|| state.shutdown.clone()),
    };
    let body = Body::from_stream(payload_stream(session, target, len, options));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg")),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        body,
    )
        .into_response())
}

/// Image routes; other methods on the path get the hint too.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(IMAGE_PATH, get(get_image).fallback(hint::hint))
}
