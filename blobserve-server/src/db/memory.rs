//! In-memory payload store
//!
//! Behaves like a bounded pool: sessions are permits on a semaphore, acquire
//! times out, and close waits until every permit is back. Counts acquisitions
//! and releases so tests can check that every borrowed session is returned.
//! Failure injection covers the error paths a real database can produce.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{LobError, LobSession, LobStore, PayloadLookup};
use crate::models::LobTarget;

const DEFAULT_CAPACITY: u32 = 4;

type Rows = HashMap<i64, Option<Vec<u8>>>;

/// Acquire/release counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub acquired: usize,
    pub released: usize,
    /// Sessions dropped without going through `release`
    pub dropped: usize,
}

impl SessionStats {
    pub fn outstanding(&self) -> usize {
        self.acquired
            .saturating_sub(self.released)
            .saturating_sub(self.dropped)
    }
}

#[derive(Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
    dropped: AtomicUsize,
}

#[derive(Default, Clone)]
struct Faults {
    lookup: bool,
    read_from: Option<u64>,
    release: bool,
    release_delay: Option<Duration>,
    close: bool,
}

/// In-memory [`LobStore`]
pub struct MemoryLobStore {
    rows: Arc<RwLock<Rows>>,
    permits: Arc<Semaphore>,
    capacity: u32,
    acquire_timeout: Duration,
    closed: AtomicBool,
    counters: Arc<Counters>,
    faults: Faults,
}

impl MemoryLobStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            acquire_timeout: Duration::from_secs(5),
            closed: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
            faults: Faults::default(),
        }
    }

    /// Insert or replace a row; `None` stores a NULL payload.
    pub fn with_row(self, id: i64, payload: Option<Vec<u8>>) -> Self {
        self.put(id, payload);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Every lookup fails with a database error.
    pub fn fail_lookups(mut self) -> Self {
        self.faults.lookup = true;
        self
    }

    /// Chunk reads at or beyond `offset` fail with a transport error.
    pub fn fail_reads_from(mut self, offset: u64) -> Self {
        self.faults.read_from = Some(offset);
        self
    }

    /// `release` reports an error (the session is still returned).
    pub fn fail_release(mut self) -> Self {
        self.faults.release = true;
        self
    }

    /// `release` takes `delay` before the session is returned.
    pub fn delay_releases(mut self, delay: Duration) -> Self {
        self.faults.release_delay = Some(delay);
        self
    }

    /// `close` fails immediately.
    pub fn fail_close(mut self) -> Self {
        self.faults.close = true;
        self
    }

    pub fn put(&self, id: i64, payload: Option<Vec<u8>>) {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        rows.insert(id, payload);
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            acquired: self.counters.acquired.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
            dropped: self.counters.dropped.load(Ordering::SeqCst),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MemoryLobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LobStore for MemoryLobStore {
    async fn acquire(&self) -> Result<Box<dyn LobSession>, LobError> {
        if self.is_closed() {
            return Err(LobError::PoolClosed);
        }

        let permit = match tokio::time::timeout(
            self.acquire_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(LobError::PoolClosed),
            Err(_) => return Err(LobError::PoolExhausted),
        };

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            rows: self.rows.clone(),
            counters: self.counters.clone(),
            faults: self.faults.clone(),
            permit: Some(permit),
        }))
    }

    async fn close(&self) -> Result<(), LobError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(LobError::PoolClosed);
        }
        if self.faults.close {
            return Err(LobError::Database(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "close failed",
            ))));
        }

        // Holding every permit means every session is back.
        let all = self
            .permits
            .acquire_many(self.capacity)
            .await
            .map_err(|_| LobError::PoolClosed)?;
        all.forget();
        self.permits.close();
        Ok(())
    }
}

struct MemorySession {
    rows: Arc<RwLock<Rows>>,
    counters: Arc<Counters>,
    faults: Faults,
    permit: Option<OwnedSemaphorePermit>,
}

impl MemorySession {
    fn payload(&self, id: i64) -> Option<Option<Vec<u8>>> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        rows.get(&id).cloned()
    }
}

#[async_trait]
impl LobSession for MemorySession {
    async fn lookup(&mut self, target: &LobTarget) -> Result<PayloadLookup, LobError> {
        if self.faults.lookup {
            return Err(LobError::Database(sqlx::Error::Protocol(
                "lookup failed".to_string(),
            )));
        }

        Ok(match self.payload(target.row_id) {
            None => PayloadLookup::Missing,
            Some(None) => PayloadLookup::Null,
            Some(Some(bytes)) => PayloadLookup::Present(bytes.len() as u64),
        })
    }

    async fn read_chunk(
        &mut self,
        target: &LobTarget,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, LobError> {
        if matches!(self.faults.read_from, Some(from) if offset >= from) {
            return Err(LobError::Database(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset mid-transfer",
            ))));
        }

        // Yield like a real round trip would.
        tokio::task::yield_now().await;

        match self.payload(target.row_id) {
            Some(Some(bytes)) => {
                let start = (offset as usize).min(bytes.len());
                let end = start.saturating_add(len).min(bytes.len());
                Ok(Bytes::copy_from_slice(&bytes[start..end]))
            }
            _ => Err(LobError::Payload("row disappeared mid-transfer".to_string())),
        }
    }

    async fn release(self: Box<Self>) -> Result<(), LobError> {
        let mut session = self;
        if let Some(delay) = session.faults.release_delay {
            tokio::time::sleep(delay).await;
        }
        session.counters.released.fetch_add(1, Ordering::SeqCst);
        session.permit.take();
        if session.faults.release {
            return Err(LobError::Database(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "release failed",
            ))));
        }
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if self.permit.is_some() {
            self.counters.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }
}
