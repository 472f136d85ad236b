//! blobserve-server: stream database payloads over HTTP
//!
//! Serves one route that streams a binary payload out of a Postgres row,
//! holding one pooled connection per request, and closes the pool with a
//! bounded grace period on shutdown.

pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod shutdown;
pub mod stream;

use std::sync::Arc;

pub use db::{LobStore, MemoryLobStore, PgLobStore, PoolConfig};
pub use error::{ServerError, ServerResult};
pub use http::{run_server, serve, ServerConfig};
pub use models::{LobTarget, PayloadConfig};
pub use shutdown::{ShutdownOutcome, ShutdownReason, ShutdownState, ShutdownTrigger};

/// Create the pool, then serve until shutdown.
///
/// Pool creation and bind failures are returned before anything is served.
pub async fn start(pool: &PoolConfig, config: ServerConfig) -> ServerResult<ShutdownOutcome> {
    let store = PgLobStore::connect(pool)
        .await
        .map_err(ServerError::PoolCreation)?;
    run_server(Arc::new(store), config).await
}
