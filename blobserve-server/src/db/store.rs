//! Payload store abstraction
//!
//! The handler only sees these traits, so the Postgres pool and the
//! in-memory store used by tests are interchangeable.

use async_trait::async_trait;
use axum::body::Bytes;

use crate::models::LobTarget;

/// Store-level error type
#[derive(Debug, thiserror::Error)]
pub enum LobError {
    #[error("no connection available before the acquire timeout")]
    PoolExhausted,

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("session already released")]
    Released,

    #[error("payload read failed: {0}")]
    Payload(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for LobError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => Self::PoolExhausted,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            other => Self::Database(other),
        }
    }
}

/// Result of looking up the payload row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLookup {
    /// No row with the target id
    Missing,
    /// Row exists, payload column is NULL
    Null,
    /// Row exists, payload has this many bytes
    Present(u64),
}

/// A pool of payload sessions.
#[async_trait]
pub trait LobStore: Send + Sync + 'static {
    /// Borrow one session. Fails with [`LobError::PoolExhausted`] when the
    /// pool cannot supply one in time.
    async fn acquire(&self) -> Result<Box<dyn LobSession>, LobError>;

    /// Close the pool, waiting for every borrowed session to come back.
    /// Callers bound this with their own grace period.
    async fn close(&self) -> Result<(), LobError>;
}

/// One borrowed connection.
#[async_trait]
pub trait LobSession: Send {
    async fn lookup(&mut self, target: &LobTarget) -> Result<PayloadLookup, LobError>;

    /// Read up to `len` bytes starting at the 0-based `offset`.
    async fn read_chunk(
        &mut self,
        target: &LobTarget,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, LobError>;

    /// Return the session to its pool.
    async fn release(self: Box<Self>) -> Result<(), LobError>;
}
