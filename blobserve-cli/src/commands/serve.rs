//! HTTP server command
//!
//! Creates the pool, serves `/getimage` and exits with the shutdown outcome's
//! exit code.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use blobserve_server::start;

use crate::config::{
    resolve_payload, resolve_pool, resolve_server, DatabaseArgs, FileConfig, PayloadArgs,
    ServerArgs,
};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub payload: PayloadArgs,
}

/// Run the HTTP server (blocks until shutdown)
pub async fn run_serve(args: ServeArgs, config_path: Option<&Path>) -> Result<ExitCode> {
    let file = FileConfig::load(config_path)?;
    let pool = resolve_pool(&args.database, &file.database)?;
    let payload = resolve_payload(&args.payload, &file.payload)?;
    let config = resolve_server(&args.server, &file.server, payload);

    tracing::info!(
        bind = %config.bind_addr,
        grace_secs = config.grace.as_secs(),
        "Starting blobserve"
    );

    let outcome = start(&pool, config).await.context("Server error")?;

    tracing::info!(
        reason = %outcome.reason,
        state = ?outcome.state,
        exit_code = outcome.exit_code(),
        "Exiting"
    );
    Ok(ExitCode::from(outcome.exit_code()))
}
