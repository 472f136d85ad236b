//! Axum server setup
//!
//! Server skeleton with:
//! - One image route, everything else answered with a hint
//! - Tracing middleware
//! - Pool shutdown with a bounded grace period

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::routes;
use crate::db::LobStore;
use crate::error::ServerError;
use crate::models::PayloadConfig;
use crate::shutdown::{
    self, ShutdownCoordinator, ShutdownOutcome, ShutdownReason, ShutdownTrigger, DEFAULT_GRACE,
};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:7000)
    pub bind_addr: SocketAddr,

    /// Time in-flight requests get to return connections on shutdown
    pub grace: Duration,

    /// Shut the whole process down when a payload transfer fails mid-stream
    pub abort_on_stream_error: bool,

    pub payload: PayloadConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7000)),
            grace: DEFAULT_GRACE,
            abort_on_stream_error: true,
            payload: PayloadConfig::default(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LobStore>,
    pub payload: PayloadConfig,
    /// Body of the hint response
    pub hint: String,
    pub shutdown: ShutdownTrigger,
    pub abort_on_stream_error: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LobStore>,
        payload: PayloadConfig,
        port: u16,
        shutdown: ShutdownTrigger,
    ) -> Self {
        Self {
            store,
            payload,
            hint: routes::hint::hint_text(port),
            shutdown,
            abort_on_stream_error: true,
        }
    }
}

/// Build the router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::image::router())
        .fallback(routes::hint::hint)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind the configured address and serve until shutdown.
///
/// Installs the SIGINT/SIGTERM listener. The returned outcome carries the
/// process exit code.
///
/// # Example
///
/// ```ignore
/// let store = PgLobStore::connect(&pool_config).await?;
/// let outcome = run_server(Arc::new(store), ServerConfig::default()).await?;
/// std::process::exit(outcome.exit_code().into());
/// ```
pub async fn run_server(
    store: Arc<dyn LobStore>,
    config: ServerConfig,
) -> Result<ShutdownOutcome, ServerError> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| ServerError::ListenBind {
            addr: config.bind_addr,
            source,
        })?;

    let trigger = ShutdownTrigger::new();
    shutdown::spawn_signal_listener(trigger.clone());

    serve(listener, store, config, trigger).await
}

/// Serve on an already bound listener until `trigger` fires, then close the
/// pool.
///
/// The HTTP server stops accepting connections on shutdown but in-flight
/// transfers keep running while the pool drains. Whatever is still running
/// after the grace period is abandoned.
pub async fn serve(
    listener: TcpListener,
    store: Arc<dyn LobStore>,
    config: ServerConfig,
    trigger: ShutdownTrigger,
) -> Result<ShutdownOutcome, ServerError> {
    let local_addr = listener.local_addr()?;

    let mut state = AppState::new(
        store.clone(),
        config.payload.clone(),
        local_addr.port(),
        trigger.clone(),
    );
    state.abort_on_stream_error = config.abort_on_stream_error;
    let app = build_router(state);

    tracing::info!(
        addr = %local_addr,
        table = %config.payload.target.table,
        row_id = config.payload.target.row_id,
        "Server listening"
    );

    let graceful = trigger.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                graceful.wait().await;
            })
            .await
    });

    let coordinator = ShutdownCoordinator::new(store, config.grace, trigger.clone());

    let outcome = tokio::select! {
        outcome = coordinator.run() => outcome,
        result = &mut server => {
            match result {
                Ok(Ok(())) => {
                    tracing::warn!("Server stopped without a shutdown request");
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Server error");
                    let outcome = coordinator.drain(ShutdownReason::ServerStopped).await;
                    tracing::info!(state = ?outcome.state, "Pool closed after server error");
                    return Err(ServerError::Serve(e));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Server task failed");
                }
            }
            coordinator.drain(ShutdownReason::ServerStopped).await
        }
    };
    server.abort();

    Ok(outcome)
}
