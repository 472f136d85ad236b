//! Postgres-backed payload store
//!
//! Each session is a read-only REPEATABLE READ transaction on one pooled
//! connection, so every chunk of a payload comes from the same snapshot.
//! Dropping a session rolls the transaction back and returns the connection.

use async_trait::async_trait;
use axum::body::Bytes;
use sqlx::{PgPool, Postgres, Transaction};

use super::pool::{create_pool, PoolConfig};
use super::{LobError, LobSession, LobStore, PayloadLookup};
use crate::models::LobTarget;

/// [`LobStore`] over a sqlx `PgPool`
#[derive(Clone)]
pub struct PgLobStore {
    pool: PgPool,
}

impl PgLobStore {
    /// Create the pool and wrap it.
    pub async fn connect(config: &PoolConfig) -> Result<Self, sqlx::Error> {
        let pool = create_pool(config).await?;
        tracing::info!(
            max_connections = config.max_connections,
            "Connection pool created"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LobStore for PgLobStore {
    async fn acquire(&self) -> Result<Box<dyn LobSession>, LobError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgSession { tx }))
    }

    async fn close(&self) -> Result<(), LobError> {
        if self.pool.is_closed() {
            return Err(LobError::PoolClosed);
        }
        // Resolves once every checked-out connection has been returned.
        self.pool.close().await;
        Ok(())
    }
}

struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LobSession for PgSession {
    async fn lookup(&mut self, target: &LobTarget) -> Result<PayloadLookup, LobError> {
        let sql = target.length_query();
        let row: Option<(Option<i64>,)> = sqlx::query_as(&sql)
            .bind(target.row_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(match row {
            None => PayloadLookup::Missing,
            Some((None,)) => PayloadLookup::Null,
            Some((Some(len),)) => PayloadLookup::Present(len.max(0) as u64),
        })
    }

    async fn read_chunk(
        &mut self,
        target: &LobTarget,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, LobError> {
        // bytea tops out at 1 GiB, so positions fit an int4.
        let start = i32::try_from(offset + 1)
            .map_err(|_| LobError::Payload(format!("offset {} out of range", offset)))?;
        let count = i32::try_from(len)
            .map_err(|_| LobError::Payload(format!("chunk length {} out of range", len)))?;

        let sql = target.chunk_query();
        let row: Option<(Option<Vec<u8>>,)> = sqlx::query_as(&sql)
            .bind(target.row_id)
            .bind(start)
            .bind(count)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some((Some(bytes),)) => Ok(Bytes::from(bytes)),
            _ => Err(LobError::Payload(
                "row disappeared mid-transfer".to_string(),
            )),
        }
    }

    async fn release(self: Box<Self>) -> Result<(), LobError> {
        // Read-only: nothing to commit.
        self.tx.rollback().await?;
        Ok(())
    }
}
