//! # Obsidian Aggregation — Funds Transaction Folding
//!
//! Collapses funds transactions that share a sender or a receiver into
//! aggregate records before a candidate block is sealed. Per pass, the
//! address covering the most pending transactions wins; its transactions
//! become one aggregate record (or, for a singleton group, stay an ordinary
//! funds transaction). Passes repeat until the before-aggregation pool is
//! empty.

pub mod aggregator;
pub mod error;

pub use aggregator::aggregate_pending;
pub use error::{AggregationError, Result};
