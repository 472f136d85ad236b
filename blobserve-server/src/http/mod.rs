//! HTTP server layer
//!
//! Axum server with:
//! - `GET /getimage` streaming the configured payload
//! - A plain-text hint for every other path
//! - Request tracing
//! - Pool shutdown on SIGINT/SIGTERM or a fatal stream error

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, run_server, serve, AppState, ServerConfig};
