//! Payload table setup
//!
//! Creates the payload table when missing and stores a payload at the
//! target row. Used by the `setup` command to prepare a database for serving.

use sqlx::PgPool;

use crate::models::LobTarget;

/// Create the payload table if it does not exist yet.
pub async fn ensure_table(pool: &PgPool, target: &LobTarget) -> Result<(), sqlx::Error> {
    sqlx::query(&target.create_table_query())
        .execute(pool)
        .await?;
    tracing::info!(table = %target.table, column = %target.column, "Payload table ready");
    Ok(())
}

/// Upsert the payload for the target row; `None` stores NULL.
pub async fn store_payload(
    pool: &PgPool,
    target: &LobTarget,
    payload: Option<&[u8]>,
) -> Result<(), sqlx::Error> {
    sqlx::query(&target.upsert_query())
        .bind(target.row_id)
        .bind(payload)
        .execute(pool)
        .await?;
    tracing::info!(
        row_id = target.row_id,
        bytes = payload.map(<[u8]>::len),
        "Payload stored"
    );
    Ok(())
}
