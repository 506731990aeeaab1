//! # Shared Types
//!
//! Domain entities shared across all Obsidian miner subsystems: the
//! transaction sum type with canonical hashing and wire encoding, accounts,
//! blocks, the merkle tree over block tx-hash sequences, and the tunable
//! system parameters.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: all cross-subsystem entities live here.
//! - **Hash independence**: canonical hashes are computed over big-endian
//!   field concatenation and never depend on the wire encoding.
//! - **No state access**: signature verification depends on dynamic account
//!   state and therefore lives in the state subsystem, not here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entities;
pub mod merkle;
pub mod params;
pub mod transaction;
pub mod wire;

pub use entities::{
    address_of, Account, Address, Block, CommitmentKey, CommitmentProof, Hash, PublicKey,
    Signature, SlashingDict, SlashingProof, EMPTY_HASH,
};
pub use merkle::merkle_root;
pub use params::{ParameterChange, ParameterError, ParameterRegistry, Parameters};
pub use transaction::{AccTx, AggTx, ConfigTx, FundsTx, IotTx, StakeTx, Transaction, TxCategory};
pub use wire::CodecError;

/// Upper bound on any account balance and any transfer amount.
pub const MAX_MONEY: u64 = 9_223_372_036_854_775_807;

/// Seconds a transaction fetch may wait on a peer response.
pub const TXFETCH_TIMEOUT: u64 = 5;

/// Seconds a block fetch may wait on a peer response.
pub const BLOCKFETCH_TIMEOUT: u64 = 40;

/// Once more than this many blocks are pending validation the node considers
/// itself behind and disables timestamp bounds checking.
pub const DELAYED_BLOCKS: usize = 10;

/// Closed blocks deeper than this below the head are compacted to their
/// without-tx form.
pub const NO_AGGREGATION_LENGTH: u32 = 5;

/// Byte length of an RSA commitment key modulus.
pub const COMM_KEY_LENGTH: usize = 256;

/// Byte length of an RSA commitment proof.
pub const COMM_PROOF_LENGTH: usize = 256;

/// Maximum attempts to fetch an aggregate transaction whose returned hash
/// does not match the requested one.
pub const AGG_TX_FETCH_ATTEMPTS: u32 = 3;
