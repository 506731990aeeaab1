//! Error types for block production.

use ob_02_state::StateError;
use ob_04_aggregation::AggregationError;
use shared_crypto::CryptoError;
use thiserror::Error;

use crate::ports::VmExecutionError;
use crate::sortition::SortitionError;

/// Result type alias for block production operations.
pub type Result<T> = std::result::Result<T, ProductionError>;

/// Errors that can occur while assembling or sealing a block.
#[derive(Debug, Error)]
pub enum ProductionError {
    /// The transaction fee is below the active minimum.
    #[error("transaction fee too low: {fee} (minimum is {minimum})")]
    FeeTooLow {
        /// Fee carried by the transaction.
        fee: u64,
        /// Active `fee_minimum` parameter.
        minimum: u64,
    },

    /// Verification or a state rule rejected the transaction.
    #[error(transparent)]
    State(#[from] StateError),

    /// Aggregate records are constructed by the miner, never submitted.
    #[error("transaction category cannot be added directly")]
    UnsupportedCategory,

    /// The contract virtual machine rejected the invocation.
    #[error(transparent)]
    Contract(#[from] VmExecutionError),

    /// The aggregation pass failed.
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    /// Commitment proof signing failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Sortition was cancelled or failed.
    #[error(transparent)]
    Sortition(#[from] SortitionError),

    /// The validator's own account is missing from the state.
    #[error("validator account not present in the state")]
    MissingValidatorAccount,
}
