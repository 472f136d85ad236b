//! Table setup command
//!
//! Creates the payload table and stores an image at the configured row.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use blobserve_server::db::{create_pool, setup};

use crate::config::{resolve_pool, resolve_target, DatabaseArgs, FileConfig, PayloadArgs};

/// Arguments for the setup command
#[derive(Parser, Debug)]
pub struct SetupArgs {
    /// Image file to store at the target row
    #[arg(long, short = 'i', required_unless_present = "null", conflicts_with = "null")]
    pub image: Option<PathBuf>,

    /// Store a NULL payload instead of an image
    #[arg(long)]
    pub null: bool,

    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub payload: PayloadArgs,
}

pub async fn run_setup(args: SetupArgs, config_path: Option<&Path>) -> Result<()> {
    let file = FileConfig::load(config_path)?;
    let pool_config = resolve_pool(&args.database, &file.database)?;
    let target = resolve_target(&args.payload, &file.payload)?;

    let payload = match &args.image {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read image: {}", path.display()))?,
        ),
        None => None,
    };

    let pool = create_pool(&pool_config)
        .await
        .context("Failed to create database pool")?;

    setup::ensure_table(&pool, &target)
        .await
        .context("Failed to create payload table")?;
    setup::store_payload(&pool, &target, payload.as_deref())
        .await
        .context("Failed to store payload")?;

    pool.close().await;
    println!(
        "Stored {} at {}.{} id={}",
        payload
            .as_ref()
            .map(|p| format!("{} bytes", p.len()))
            .unwrap_or_else(|| "NULL".to_string()),
        target.table,
        target.column,
        target.row_id
    );
    Ok(())
}
