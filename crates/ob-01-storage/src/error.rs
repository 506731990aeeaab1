//! Error types for the storage subsystem.

use shared_types::Hash;
use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the tx/block stores.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// A block expected in closed storage was not found.
    #[error("block {} not found in closed storage", hex_prefix(.0))]
    BlockNotFound(Hash),

    /// A transaction expected in a store was not found.
    #[error("transaction {} not found", hex_prefix(.0))]
    TxNotFound(Hash),
}

fn hex_prefix(hash: &Hash) -> String {
    hash[..8].iter().map(|b| format!("{b:02x}")).collect()
}
