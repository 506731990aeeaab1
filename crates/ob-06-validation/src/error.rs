//! Error types for block validation.

use ob_01_storage::StorageError;
use ob_02_state::StateError;
use ob_03_tx_fetch::FetchError;
use shared_crypto::CryptoError;
use shared_types::Hash;
use thiserror::Error;

/// Result type alias for validation operations.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Errors that reject a block.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// No validated head exists yet to resolve branches against.
    #[error("no chain head available")]
    HeadMissing,

    /// The new block's branch never meets the local chain.
    #[error("no common ancestor found for the incoming branch")]
    NoCommonAncestor,

    /// A rollback walked off the closed chain.
    #[error("closed chain broken at {}", short(.0))]
    ClosedChainBroken(Hash),

    /// Block timestamp diverges more than one hour from system time.
    #[error("timestamp {timestamp} out of bounds (system time {system_time})")]
    TimestampOutOfBounds {
        /// Timestamp declared by the block.
        timestamp: i64,
        /// Network-synchronized time at check.
        system_time: i64,
    },

    /// Serialized block exceeds the active size limit.
    #[error("block size {size} exceeds limit {limit}")]
    BlockTooLarge {
        /// Serialized block size.
        size: u64,
        /// Active `block_size` parameter.
        limit: u64,
    },

    /// The same tx hash appears twice across the block's sequences.
    #[error("duplicate transaction hash {} in block", short(.0))]
    DuplicateTx(Hash),

    /// The beneficiary is unknown or not part of the validator set.
    #[error("beneficiary is not part of the validator set")]
    BeneficiaryNotStaking,

    /// The commitment proof does not verify against the beneficiary's key.
    #[error("the submitted commitment proof can not be verified")]
    CommitmentProofInvalid,

    /// The declared nonce fails the difficulty predicate.
    #[error("proof of stake nonce is incorrect")]
    PosInvalid,

    /// The beneficiary has not waited long enough since staking.
    #[error("validator at height {height} must wait {minimum} blocks after staking at {staking_height}")]
    WaitingMinimumUnmet {
        /// Height of the rejected block.
        height: u32,
        /// Height at which the beneficiary started staking.
        staking_height: u32,
        /// Active `waiting_minimum` parameter.
        minimum: u64,
    },

    /// The attached slashing proof failed verification.
    #[error("invalid slashing proof: {0}")]
    SlashingProofInvalid(String),

    /// Recomputed merkle root differs from the header.
    #[error("merkle root is incorrect")]
    MerkleMismatch,

    /// Payload fetching failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A state transition rejected the block.
    #[error(transparent)]
    State(#[from] StateError),

    /// Storage gave out mid-validation or mid-rollback.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A cryptographic check could not be carried out.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

fn short(hash: &Hash) -> String {
    hash[..8].iter().map(|b| format!("{b:02x}")).collect()
}
