//! Domain models for payload lookups
//!
//! Everything that ends up interpolated into SQL is validated here first.

pub mod target;
pub mod validation;

pub use target::{LobTarget, PayloadConfig, SqlIdent};
pub use validation::ValidationError;
