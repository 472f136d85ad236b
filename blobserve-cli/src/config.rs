//! Layered configuration
//!
//! Precedence, lowest first: built-in defaults, the TOML file given with
//! `--config`, then environment variables and command-line flags.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:7000"
//! grace_secs = 2
//! abort_on_stream_error = true
//!
//! [database]
//! url = "postgres://localhost/blobserve"
//! max_connections = 4
//!
//! [payload]
//! table = "no_lobs"
//! column = "b"
//! row_id = 2
//! chunk_size = 65536
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use blobserve_server::db::pool::{DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_CONNECTIONS};
use blobserve_server::models::target::DEFAULT_CHUNK_SIZE;
use blobserve_server::shutdown::DEFAULT_GRACE;
use blobserve_server::{LobTarget, PayloadConfig, PoolConfig, ServerConfig};
use clap::Args;
use serde::Deserialize;

/// Contents of the config file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub payload: PayloadSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<SocketAddr>,
    pub grace_secs: Option<u64>,
    pub abort_on_stream_error: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PayloadSection {
    pub table: Option<String>,
    pub column: Option<String>,
    pub row_id: Option<i64>,
    pub chunk_size: Option<usize>,
}

impl FileConfig {
    /// Load the config file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid TOML")
    }
}

/// Database connection flags
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseArgs {
    /// Database URL (overrides config file)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Maximum pooled connections
    #[arg(long, env = "BLOBSERVE_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Connections kept open while idle
    #[arg(long, env = "BLOBSERVE_MIN_CONNECTIONS")]
    pub min_connections: Option<u32>,

    /// Seconds a request waits for a free connection
    #[arg(long, env = "BLOBSERVE_ACQUIRE_TIMEOUT_SECS")]
    pub acquire_timeout_secs: Option<u64>,
}

/// Which payload to serve
#[derive(Args, Debug, Clone, Default)]
pub struct PayloadArgs {
    /// Table holding the payload (default: no_lobs)
    #[arg(long, env = "BLOBSERVE_TABLE")]
    pub table: Option<String>,

    /// Payload column (default: b)
    #[arg(long, env = "BLOBSERVE_COLUMN")]
    pub column: Option<String>,

    /// Row id to serve (default: 2)
    #[arg(long, env = "BLOBSERVE_ROW_ID", allow_negative_numbers = true)]
    pub row_id: Option<i64>,

    /// Bytes read per chunk (default: 65536)
    #[arg(long, env = "BLOBSERVE_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,
}

/// Server flags
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Address to bind to (default: 127.0.0.1:7000)
    #[arg(long, short = 'b', env = "BLOBSERVE_BIND")]
    pub bind: Option<SocketAddr>,

    /// Seconds in-flight requests get on shutdown (default: 2)
    #[arg(long, env = "BLOBSERVE_GRACE_SECS")]
    pub grace_secs: Option<u64>,

    /// Shut down when a transfer fails mid-stream (default: true)
    #[arg(long, env = "BLOBSERVE_ABORT_ON_STREAM_ERROR")]
    pub abort_on_stream_error: Option<bool>,
}

pub fn resolve_pool(args: &DatabaseArgs, file: &DatabaseSection) -> Result<PoolConfig> {
    let url = args
        .database_url
        .clone()
        .or_else(|| file.url.clone())
        .context("DATABASE_URL not set. Set via --database-url, DATABASE_URL env, or [database] url in the config file")?;

    let mut config = PoolConfig::new(url);
    config.max_connections = args
        .max_connections
        .or(file.max_connections)
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);
    config.min_connections = args.min_connections.or(file.min_connections).unwrap_or(0);
    config.acquire_timeout = args
        .acquire_timeout_secs
        .or(file.acquire_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT);

    if config.max_connections == 0 {
        anyhow::bail!("max_connections must be at least 1");
    }
    if config.min_connections > config.max_connections {
        anyhow::bail!(
            "min_connections ({}) exceeds max_connections ({})",
            config.min_connections,
            config.max_connections
        );
    }
    Ok(config)
}

pub fn resolve_target(args: &PayloadArgs, file: &PayloadSection) -> Result<LobTarget> {
    let defaults = LobTarget::default();
    let table = args
        .table
        .clone()
        .or_else(|| file.table.clone())
        .unwrap_or_else(|| defaults.table.to_string());
    let column = args
        .column
        .clone()
        .or_else(|| file.column.clone())
        .unwrap_or_else(|| defaults.column.to_string());
    let row_id = args.row_id.or(file.row_id).unwrap_or(defaults.row_id);

    LobTarget::new(&table, &column, row_id).context("invalid payload target")
}

pub fn resolve_payload(args: &PayloadArgs, file: &PayloadSection) -> Result<PayloadConfig> {
    let target = resolve_target(args, file)?;
    let chunk_size = args
        .chunk_size
        .or(file.chunk_size)
        .unwrap_or(DEFAULT_CHUNK_SIZE);
    PayloadConfig::new(target, chunk_size).context("invalid payload settings")
}

pub fn resolve_server(
    args: &ServerArgs,
    file: &ServerSection,
    payload: PayloadConfig,
) -> ServerConfig {
    let defaults = ServerConfig::default();
    ServerConfig {
        bind_addr: args.bind.or(file.bind).unwrap_or(defaults.bind_addr),
        grace: args
            .grace_secs
            .or(file.grace_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_GRACE),
        abort_on_stream_error: args
            .abort_on_stream_error
            .or(file.abort_on_stream_error)
            .unwrap_or(defaults.abort_on_stream_error),
        payload,
    }
}
