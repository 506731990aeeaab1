//! Error types for the aggregation pass.

use thiserror::Error;

/// Result type alias for aggregation operations.
pub type Result<T> = std::result::Result<T, AggregationError>;

/// Errors that can occur while folding funds transactions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregationError {
    /// The pool reported pending transactions but neither tally produced a
    /// candidate address.
    #[error("pending transactions without a selectable sender or receiver")]
    EmptySelection,

    /// Summing the member amounts overflowed.
    #[error("aggregate amount overflow")]
    AmountOverflow,
}
