//! Shared error context helpers, id normalization, and clock utilities used across
//! all wapanel crates.

pub mod error;
pub mod ids;
pub mod time;

pub use error::FromMessage;
