//! Error types for transaction and block fetching.

use shared_types::{Hash, TxCategory};
use thiserror::Error;

/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Errors that can occur while resolving tx payloads or blocks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// A block referenced a transaction that was already closed by an
    /// earlier block (outside of initial sync).
    #[error("{category} tx {} was already closed by a previous block", short(.hash))]
    PreviouslyClosedTx {
        /// Requested transaction hash.
        hash: Hash,
        /// Category the hash was listed under.
        category: TxCategory,
    },

    /// The peer did not answer within `TXFETCH_TIMEOUT`.
    #[error("{category} tx fetch timed out")]
    Timeout {
        /// Category whose fetch timed out.
        category: TxCategory,
    },

    /// The returned payload hashes to something other than the request.
    #[error("received {category} tx hash did not correspond to the request")]
    HashMismatch {
        /// Requested transaction hash.
        hash: Hash,
        /// Category the request was made under.
        category: TxCategory,
    },

    /// The returned payload is of a different category than requested.
    #[error("received payload for {} is not a {category} tx", short(.hash))]
    WrongCategory {
        /// Requested transaction hash.
        hash: Hash,
        /// Category the request was made under.
        category: TxCategory,
    },

    /// The peer request could not be issued.
    #[error("peer request failed: {0}")]
    RequestFailed(String),

    /// The response channel was closed while waiting.
    #[error("{category} response channel closed")]
    ChannelClosed {
        /// Category whose channel closed.
        category: TxCategory,
    },

    /// The peer did not return the block within `BLOCKFETCH_TIMEOUT`.
    #[error("block fetch timed out")]
    BlockTimeout,

    /// A fetched block could not be decoded or did not match the request.
    #[error("fetched block invalid: {0}")]
    BadBlock(String),

    /// A fetcher task ended without reporting a result.
    #[error("fetch task aborted")]
    TaskAborted,
}

fn short(hash: &Hash) -> String {
    hash[..8].iter().map(|b| format!("{b:02x}")).collect()
}
