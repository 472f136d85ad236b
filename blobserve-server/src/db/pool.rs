//! Database connection pool lifecycle
//!
//! The pool is created once at startup and closed once at shutdown.
//! Creation connects eagerly so bad credentials or an unreachable database
//! fail before the server starts listening.

use std::fmt;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::LobStore;
use crate::shutdown::ShutdownState;

/// Default maximum connections for the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Default time a request waits for a free connection.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// Pool configuration
#[derive(Clone)]
pub struct PoolConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 0,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

// The URL usually carries a password.
impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("database_url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// Create a PostgreSQL connection pool.
///
/// # Errors
///
/// Returns an error if the first connection cannot be established.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool(&PoolConfig::new("postgres://localhost/blobserve")).await?;
/// ```
pub async fn create_pool(config: &PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
}

/// Close the pool, giving borrowed connections up to `grace` to come back.
///
/// Returns the terminal shutdown state: `Closed` when everything drained,
/// `ForceClosed` when the grace period ran out (outstanding connections are
/// abandoned), `ClosedWithError` when the close itself failed.
pub async fn stop(store: &dyn LobStore, grace: Duration) -> ShutdownState {
    tracing::info!(grace_ms = grace.as_millis() as u64, "Closing connection pool");

    match tokio::time::timeout(grace, store.close()).await {
        Ok(Ok(())) => {
            tracing::info!("Connection pool closed");
            ShutdownState::Closed
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to close connection pool");
            ShutdownState::ClosedWithError
        }
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "Connections still in use after grace period, forcing pool closed"
            );
            ShutdownState::ForceClosed
        }
    }
}
