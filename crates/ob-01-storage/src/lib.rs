//! # Obsidian Storage — Transaction & Block Stores
//!
//! The storage access surface consumed by the miner core. Transactions move
//! between three stores over their lifecycle:
//!
//! - **open**: received but not yet included in a validated block
//! - **invalid**: failed verification on receipt; re-checked on demand
//!   (lowers peer re-requests when a tx becomes valid later)
//! - **closed**: included in a validated block
//!
//! Blocks move open → closed; ancestors deep enough below the head are
//! compacted to a without-tx form keyed by their without-tx hash.
//!
//! The traits here are driven ports: production nodes back them with a
//! persistent KV store, tests use the in-memory adapters in this crate.

pub mod block_store;
pub mod error;
pub mod pre_aggregation;
pub mod tx_store;

pub use block_store::{BlockStore, InMemoryBlockStore};
pub use error::{Result, StorageError};
pub use pre_aggregation::PreAggregationPool;
pub use tx_store::{InMemoryTxStore, TxStore};
