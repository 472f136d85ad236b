//! Subcommand implementations

pub mod serve;
pub mod setup;

pub use serve::{run_serve, ServeArgs};
pub use setup::{run_setup, SetupArgs};
