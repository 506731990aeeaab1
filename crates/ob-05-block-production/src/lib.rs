//! # Obsidian Block Production — Assembly & Sortition
//!
//! Builds candidate blocks: pulls verified transactions into a per-block
//! state overlay, folds pending funds transfers through the aggregation
//! pass, and seals the result with a proof-of-stake nonce found by
//! cryptographic sortition.
//!
//! ## Sealing sequence
//!
//! slashing proof → aggregation → merkle root → beneficiary → commitment
//! proof → sortition → final hashes → tx counts. The sortition loop is
//! cooperatively cancellable; a cancelled seal deletes any aggregate
//! records it created speculatively.

#![warn(clippy::all)]

pub mod assembler;
pub mod error;
pub mod ports;
pub mod sortition;

pub use assembler::{BlockAssembler, Candidate};
pub use error::{ProductionError, Result};
pub use ports::{
    ContractVm, DifficultySource, FixedDifficulty, FixedTimeSource, NoopVm, SystemTimeSource,
    TimeSource, VmExecutionError,
};
pub use sortition::{leading_zero_bits, proof_of_stake, validate_proof_of_stake, SortitionError};
