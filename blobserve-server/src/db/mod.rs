//! Database layer - connection pool, payload sessions and table setup
//!
//! # Design Principles
//!
//! - One pool per process, owned by the caller and injected into the router
//! - One session per request, held for the whole payload transfer
//! - Payloads are read in chunks, never loaded whole

pub mod memory;
pub mod pool;
pub mod postgres;
pub mod setup;
pub mod store;

pub use memory::{MemoryLobStore, SessionStats};
pub use pool::{create_pool, stop, PoolConfig};
pub use postgres::PgLobStore;
pub use store::{LobError, LobSession, LobStore, PayloadLookup};
