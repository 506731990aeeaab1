//! # Obsidian Tx Fetch — Peer Transaction & Block Retrieval
//!
//! Resolves the transaction payloads a block header references. Lookups go
//! closed store → open store → (funds only) invalid stash → peer request
//! with a bounded wait on the per-category response channel. The six
//! categories are fetched in parallel; aggregate records additionally fan
//! out into a nested fetch of their member funds transactions.
//!
//! Any single failure — timeout, hash mismatch, previously closed tx —
//! fails the whole pre-validation of the block.

pub mod block_fetch;
pub mod error;
pub mod fetcher;
pub mod ports;

pub use block_fetch::fetch_block;
pub use error::{FetchError, Result};
pub use fetcher::{BlockPayloads, TxFetcher};
pub use ports::{peer_channels, InMemoryPeer, PeerChannels, PeerNetwork, PeerSenders};
