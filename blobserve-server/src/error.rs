//! Error types for blobserve-server

use std::net::SocketAddr;

use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

/// Startup and serve errors. All of them are fatal.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to create connection pool: {0}")]
    PoolCreation(#[source] sqlx::Error),

    #[error("failed to bind {addr}: {source}")]
    ListenBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Serve(#[from] std::io::Error),
}
