//! Fallback for every path other than the image route

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use super::image::IMAGE_PATH;
use crate::http::server::AppState;

/// Hint body pointing at the image route.
pub fn hint_text(port: u16) -> String {
    format!("Try http://localhost:{}{}", port, IMAGE_PATH)
}

/// Any path, any method: 200 with the hint. Never a 404.
pub async fn hint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        state.hint.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_names_port_and_route() {
        assert_eq!(hint_text(7000), "Try http://localhost:7000/getimage");
    }
}
