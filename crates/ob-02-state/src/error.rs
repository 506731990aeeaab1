//! Error types for state access, verification, and transitions.

use shared_types::{Address, ParameterError};
use thiserror::Error;

/// Result type alias for state operations.
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur while verifying transactions or mutating state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// A referenced account does not exist in the state.
    #[error("account {} not present in the state", short(.0))]
    UnknownAccount(Address),

    /// An account creation would overwrite an existing account.
    #[error("account {} already exists", short(.0))]
    AccountAlreadyExists(Address),

    /// Sender balance cannot cover amount plus fee.
    #[error("account {}: balance {balance} below required {required}", short(.address))]
    InsufficientFunds {
        /// Sender address.
        address: Address,
        /// Current balance.
        balance: u64,
        /// Amount plus fee needed.
        required: u64,
    },

    /// Crediting the receiver would exceed `MAX_MONEY`.
    #[error("account {}: balance {balance} + {amount} exceeds the money supply cap", short(.address))]
    BalanceOverflow {
        /// Receiver address.
        address: Address,
        /// Current balance.
        balance: u64,
        /// Amount being credited.
        amount: u64,
    },

    /// The transaction counter does not match the sender account.
    #[error("account {}: tx counter {actual} does not match state counter {expected}", short(.address))]
    TxCntMismatch {
        /// Sender address.
        address: Address,
        /// Counter recorded in the account.
        expected: u32,
        /// Counter carried by the transaction.
        actual: u32,
    },

    /// Transfer amount is zero or above `MAX_MONEY`.
    #[error("invalid transaction amount {0}")]
    InvalidAmount(u64),

    /// Sender and receiver are the same account.
    #[error("sender and receiver are the same account")]
    SelfTransfer,

    /// The signature does not verify against the expected signer.
    #[error("transaction signature could not be verified")]
    InvalidSignature,

    /// An aggregate record's amount does not equal its members' sum.
    #[error("aggregate amount {declared} does not match member sum {computed}")]
    AggAmountMismatch {
        /// Amount declared by the aggregate record.
        declared: u64,
        /// Sum over the member transactions.
        computed: u64,
    },

    /// An aggregate record without members or without a sender set.
    #[error("aggregate record is missing members or senders")]
    EmptyAggregate,

    /// The staking flag already has the requested value.
    #[error("account {} already has the requested staking flag", short(.0))]
    StakingFlagUnchanged(Address),

    /// Balance below fee plus staking minimum.
    #[error("account {}: balance {balance} below fee + staking minimum {required}", short(.address))]
    StakeBelowMinimum {
        /// Staking account address.
        address: Address,
        /// Current balance.
        balance: u64,
        /// Fee plus staking minimum.
        required: u64,
    },

    /// A config transaction carries an out-of-range payload.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

fn short(address: &Address) -> String {
    address[..8].iter().map(|b| format!("{b:02x}")).collect()
}
