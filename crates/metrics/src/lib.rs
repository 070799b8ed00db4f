//! Metric names for wapanel.
//!
//! This crate re-exports the `metrics` crate facade so other crates can record
//! counters and histograms behind their optional `metrics` feature without
//! depending on the facade directly. With no recorder installed every macro
//! is a no-op.
//!
//! ```rust,ignore
//! use wapanel_metrics::{auto_reply, counter, labels};
//!
//! counter!(auto_reply::REPLIES_SENT_TOTAL, labels::SOURCE => "rule").increment(1);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
