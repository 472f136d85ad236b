//! Shutdown coordination
//!
//! ```text
//! Running -> Draining -> Closed           pool drained within the grace period
//!                     -> ForceClosed      grace period elapsed
//!                     -> ClosedWithError  close itself failed
//! ```
//!
//! Triggered by SIGINT/SIGTERM or by a fatal payload stream error. The first
//! trigger wins; later ones are logged and ignored.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::{self, LobStore};

/// Default time in-flight requests get to return their connections.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Why shutdown started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// A payload transfer failed mid-stream
    StreamError(String),
    /// The HTTP server stopped on its own
    ServerStopped,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt signal"),
            Self::Terminate => f.write_str("terminate signal"),
            Self::StreamError(e) => write!(f, "stream error: {}", e),
            Self::ServerStopped => f.write_str("server stopped"),
        }
    }
}

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Closed,
    ForceClosed,
    ClosedWithError,
}

/// Final result of a shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownOutcome {
    pub reason: ShutdownReason,
    pub state: ShutdownState,
}

impl ShutdownOutcome {
    /// Process exit code: a forced close still counts as a clean shutdown.
    pub fn exit_code(&self) -> u8 {
        match self.state {
            ShutdownState::ClosedWithError => 1,
            _ => 0,
        }
    }
}

/// Cloneable handle that starts shutdown.
#[derive(Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Returns false if shutdown was already requested.
    pub fn fire(&self, reason: ShutdownReason) -> bool {
        let mut ignored = None;
        let accepted = self.tx.send_if_modified(|current| {
            if current.is_some() {
                ignored = Some(reason.clone());
                return false;
            }
            *current = Some(reason.clone());
            true
        });

        if accepted {
            tracing::warn!(%reason, "Shutdown requested");
        } else if let Some(reason) = ignored {
            tracing::info!(%reason, "Shutdown already in progress, ignoring");
        }
        accepted
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.tx.borrow().clone()
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            // The sender lives in `self`, so this only fails if it is gone.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
pub async fn wait_for_signal() -> ShutdownReason {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => ShutdownReason::Interrupt,
        _ = terminate => ShutdownReason::Terminate,
    }
}

/// Fire `trigger` on the first termination signal.
pub fn spawn_signal_listener(trigger: ShutdownTrigger) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = wait_for_signal().await;
        trigger.fire(reason);
    })
}

/// Drives the pool from `Running` to a terminal state.
pub struct ShutdownCoordinator {
    store: Arc<dyn LobStore>,
    grace: Duration,
    trigger: ShutdownTrigger,
    state: Mutex<ShutdownState>,
}

impl ShutdownCoordinator {
    pub fn new(store: Arc<dyn LobStore>, grace: Duration, trigger: ShutdownTrigger) -> Self {
        Self {
            store,
            grace,
            trigger,
            state: Mutex::new(ShutdownState::Running),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a trigger, then drain.
    pub async fn run(&self) -> ShutdownOutcome {
        let reason = self.trigger.wait().await;
        self.drain(reason).await
    }

    /// Close the pool within the grace period.
    pub async fn drain(&self, reason: ShutdownReason) -> ShutdownOutcome {
        self.transition(ShutdownState::Draining);
        let state = db::stop(self.store.as_ref(), self.grace).await;
        self.transition(state);

        tracing::info!(%reason, ?state, "Shutdown complete");
        ShutdownOutcome { reason, state }
    }

    fn transition(&self, next: ShutdownState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?*state, to = ?next, "Shutdown state change");
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryLobStore;

    #[test]
    fn first_trigger_wins() {
        let trigger = ShutdownTrigger::new();
        assert!(trigger.reason().is_none());

        assert!(trigger.fire(ShutdownReason::Terminate));
        assert!(!trigger.fire(ShutdownReason::Interrupt));
        assert_eq!(trigger.reason(), Some(ShutdownReason::Terminate));
    }

    #[tokio::test]
    async fn wait_sees_earlier_and_later_triggers() {
        let trigger = ShutdownTrigger::new();
        let waiter = {
            let trigger = trigger.clone();
            tokio::spawn(async move { trigger.wait().await })
        };
        tokio::task::yield_now().await;

        trigger.fire(ShutdownReason::StreamError("reset".into()));
        assert_eq!(
            waiter.await.unwrap(),
            ShutdownReason::StreamError("reset".into())
        );

        // Already fired: resolves immediately.
        assert_eq!(
            trigger.wait().await,
            ShutdownReason::StreamError("reset".into())
        );
    }

    #[test]
    fn exit_codes() {
        let outcome = |state| ShutdownOutcome {
            reason: ShutdownReason::Terminate,
            state,
        };
        assert_eq!(outcome(ShutdownState::Closed).exit_code(), 0);
        assert_eq!(outcome(ShutdownState::ForceClosed).exit_code(), 0);
        assert_eq!(outcome(ShutdownState::ClosedWithError).exit_code(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigint_maps_to_interrupt() {
        use tokio::signal::unix::{signal, SignalKind};

        // Keep SIGINT routed through tokio for the test process.
        let _sigint = signal(SignalKind::interrupt()).unwrap();

        let mut listener = tokio::spawn(wait_for_signal());
        let reason = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                std::process::Command::new("kill")
                    .args(["-INT", &std::process::id().to_string()])
                    .status()
                    .unwrap();
                tokio::select! {
                    result = &mut listener => return result.unwrap(),
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(reason, ShutdownReason::Interrupt);
    }

    #[tokio::test]
    async fn signal_while_idle_closes_cleanly() {
        let store = Arc::new(MemoryLobStore::new());
        let trigger = ShutdownTrigger::new();
        let coordinator = ShutdownCoordinator::new(store.clone(), DEFAULT_GRACE, trigger.clone());
        assert_eq!(coordinator.state(), ShutdownState::Running);

        trigger.fire(ShutdownReason::Interrupt);
        let outcome = coordinator.run().await;

        assert_eq!(outcome.reason, ShutdownReason::Interrupt);
        assert_eq!(outcome.state, ShutdownState::Closed);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(coordinator.state(), ShutdownState::Closed);
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn drain_waits_for_session_returned_within_grace() {
        let store = Arc::new(MemoryLobStore::new());
        let session = store.acquire().await.unwrap();
        let coordinator =
            ShutdownCoordinator::new(store.clone(), DEFAULT_GRACE, ShutdownTrigger::new());

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.release().await.unwrap();
        });

        let outcome = coordinator.drain(ShutdownReason::Terminate).await;
        releaser.await.unwrap();

        assert_eq!(outcome.state, ShutdownState::Closed);
        assert_eq!(store.stats().outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_forces_close_after_grace() {
        let store = Arc::new(MemoryLobStore::new());
        let _held = store.acquire().await.unwrap();
        let coordinator =
            ShutdownCoordinator::new(store, DEFAULT_GRACE, ShutdownTrigger::new());

        let outcome = coordinator.drain(ShutdownReason::Terminate).await;

        assert_eq!(outcome.state, ShutdownState::ForceClosed);
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn close_error_exits_non_zero() {
        let store = Arc::new(MemoryLobStore::new().fail_close());
        let coordinator =
            ShutdownCoordinator::new(store, DEFAULT_GRACE, ShutdownTrigger::new());

        let outcome = coordinator.drain(ShutdownReason::Terminate).await;

        assert_eq!(outcome.state, ShutdownState::ClosedWithError);
        assert_eq!(outcome.exit_code(), 1);
    }
}
