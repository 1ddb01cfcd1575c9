//! Shared error helpers used across the agentwire crates.

pub mod error;

pub use error::FromMessage;
