//! blobserve CLI - stream database payloads over HTTP
//!
//! - `serve`: run the HTTP server on the configured pool
//! - `setup`: create the payload table and load an image into it

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "blobserve",
    author,
    version,
    about = "Stream a binary payload from a pooled Postgres connection over HTTP"
)]
struct Cli {
    /// TOML config file
    #[arg(long, short = 'c', global = true, env = "BLOBSERVE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the payload at /getimage until SIGINT/SIGTERM
    Serve(commands::ServeArgs),
    /// Create the payload table and store an image in it
    Setup(commands::SetupArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args, cli.config.as_deref()).await,
        Commands::Setup(args) => {
            commands::run_setup(args, cli.config.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
