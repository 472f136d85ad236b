//! Payload streaming with scoped session release
//!
//! A transfer reads the payload chunk by chunk from one borrowed session and
//! ends in exactly one [`StreamOutcome`]. The session goes back to the pool on
//! every path: explicitly when the transfer completes or fails, and from
//! `Drop` when the client goes away mid-transfer.

use std::sync::Arc;

use axum::body::Bytes;
use futures::stream::{self, Stream};

use crate::db::{LobError, LobSession, LobStore, PayloadLookup};
use crate::models::LobTarget;
use crate::shutdown::{ShutdownReason, ShutdownTrigger};

/// Why a transfer stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Reading a chunk failed
    Transport(String),
    /// The response body was dropped before the payload ended
    Disconnected,
}

/// How a transfer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Aborted(AbortReason),
}

/// A borrowed session that is always released.
pub struct ScopedSession {
    inner: Option<Box<dyn LobSession>>,
}

impl ScopedSession {
    pub async fn acquire(store: &dyn LobStore) -> Result<Self, LobError> {
        let session = store.acquire().await?;
        Ok(Self {
            inner: Some(session),
        })
    }

    pub async fn lookup(&mut self, target: &LobTarget) -> Result<PayloadLookup, LobError> {
        match self.inner.as_mut() {
            Some(session) => session.lookup(target).await,
            None => Err(LobError::Released),
        }
    }

    pub async fn read_chunk(
        &mut self,
        target: &LobTarget,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, LobError> {
        match self.inner.as_mut() {
            Some(session) => session.read_chunk(target, offset, len).await,
            None => Err(LobError::Released),
        }
    }

    /// Return the session. Failures are logged, never propagated, so they
    /// cannot mask the error that ended the request.
    pub async fn release(mut self) {
        if let Some(session) = self.inner.take() {
            if let Err(e) = session.release().await {
                tracing::warn!(error = %e, "Failed to release connection");
            }
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        let Some(session) = self.inner.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.release().await {
                        tracing::warn!(error = %e, "Failed to release connection");
                    }
                });
            }
            // Dropping still hands the connection back, just without cleanup.
            Err(_) => tracing::debug!("No runtime, dropping session"),
        }
    }
}

/// Stream settings for one transfer
#[derive(Clone)]
pub struct TransferOptions {
    pub chunk_size: usize,
    /// Fired on transport errors; `None` keeps the server running.
    pub abort_trigger: Option<ShutdownTrigger>,
}

struct Transfer {
    session: Option<ScopedSession>,
    target: Arc<LobTarget>,
    offset: u64,
    len: u64,
    options: TransferOptions,
}

impl Transfer {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, LobError> {
        if self.offset >= self.len {
            return Ok(None);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(LobError::Released);
        };

        let want = (self.len - self.offset).min(self.options.chunk_size as u64) as usize;
        let chunk = session.read_chunk(&self.target, self.offset, want).await?;
        if chunk.is_empty() {
            return Err(LobError::Payload(format!(
                "payload ended at {} of {} bytes",
                self.offset, self.len
            )));
        }

        self.offset += chunk.len() as u64;
        Ok(Some(chunk))
    }

    /// Report first: the body may be dropped while the release is in flight.
    async fn finish(&mut self, outcome: StreamOutcome) {
        let session = self.session.take();
        self.report(outcome);
        if let Some(session) = session {
            session.release().await;
        }
    }

    fn report(&self, outcome: StreamOutcome) {
        match outcome {
            StreamOutcome::Completed => {
                tracing::debug!(bytes = self.len, "Payload transfer completed");
            }
            StreamOutcome::Aborted(AbortReason::Disconnected) => {
                tracing::info!(
                    sent = self.offset,
                    total = self.len,
                    "Client went away mid-transfer"
                );
            }
            StreamOutcome::Aborted(AbortReason::Transport(e)) => {
                tracing::error!(
                    error = %e,
                    sent = self.offset,
                    total = self.len,
                    "Payload transfer failed"
                );
                if let Some(trigger) = &self.options.abort_trigger {
                    trigger.fire(ShutdownReason::StreamError(e));
                }
            }
        }
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        // Still holding the session means no terminal outcome was reported.
        if self.session.is_some() {
            self.report(StreamOutcome::Aborted(AbortReason::Disconnected));
        }
    }
}

/// Stream `len` bytes of the target payload out of `session`.
///
/// The session is released before the stream yields its last item, or from
/// `Drop` if the stream is dropped early.
pub fn payload_stream(
    session: ScopedSession,
    target: Arc<LobTarget>,
    len: u64,
    options: TransferOptions,
) -> impl Stream<Item = Result<Bytes, LobError>> + Send + 'static {
    let transfer = Transfer {
        session: Some(session),
        target,
        offset: 0,
        len,
        options,
    };

    stream::try_unfold(transfer, |mut transfer| async move {
        match transfer.next_chunk().await {
            Ok(Some(chunk)) => Ok(Some((chunk, transfer))),
            Ok(None) => {
                transfer.finish(StreamOutcome::Completed).await;
                Ok(None)
            }
            Err(e) => {
                transfer
                    .finish(StreamOutcome::Aborted(AbortReason::Transport(e.to_string())))
                    .await;
                Err(e)
            }
        }
    })
}
