//! Route handlers

pub mod hint;
pub mod image;
