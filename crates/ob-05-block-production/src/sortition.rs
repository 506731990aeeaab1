//! Proof-of-stake sortition.
//!
//! The lottery iterates a nonce, starting from the current unix time, until
//!
//! ```text
//! leading_zero_bits( SHA3( nonce ‖ H(prev_proofs) ‖ height ‖ balance ‖ commitment_proof ) ) ≥ d
//! ```
//!
//! holds for the current difficulty `d`. The winning nonce doubles as the
//! block timestamp, and the validator's balance scales the success
//! probability. `prev_proofs` are the commitment proofs of the most recent
//! ancestors, chaining the lottery to a particular branch.

use sha3::{Digest, Sha3_256};
use shared_types::{CommitmentProof, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Errors from the sortition loop.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SortitionError {
    /// The caller flipped the cancel flag; a superior block arrived.
    ///
    /// Any aggregate records created for the candidate must be deleted
    /// before the error surfaces further.
    #[error("sortition cancelled")]
    Cancelled,
}

/// Number of leading zero bits of a hash.
pub fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut bits = 0;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

fn sortition_hash(
    nonce: u64,
    prev_proofs: &[CommitmentProof],
    height: u32,
    balance: u64,
    commitment_proof: &CommitmentProof,
) -> Hash {
    let mut proofs_hasher = Sha3_256::new();
    for proof in prev_proofs {
        proofs_hasher.update(proof);
    }
    let prev_proofs_hash: Hash = proofs_hasher.finalize().into();

    let mut hasher = Sha3_256::new();
    hasher.update(nonce.to_be_bytes());
    hasher.update(prev_proofs_hash);
    hasher.update(height.to_be_bytes());
    hasher.update(balance.to_be_bytes());
    hasher.update(commitment_proof);
    hasher.finalize().into()
}

/// Search for a nonce satisfying the difficulty predicate.
///
/// Iterates from `start_nonce` (derived from the current time, so the nonce
/// stays a plausible timestamp) and checks the shared cancel flag on every
/// round.
pub fn proof_of_stake(
    difficulty: u8,
    prev_proofs: &[CommitmentProof],
    height: u32,
    balance: u64,
    commitment_proof: &CommitmentProof,
    start_nonce: u64,
    cancel: &AtomicBool,
) -> Result<u64, SortitionError> {
    let mut nonce = start_nonce;
    loop {
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!(height, "sortition cancelled");
            return Err(SortitionError::Cancelled);
        }

        let hash = sortition_hash(nonce, prev_proofs, height, balance, commitment_proof);
        if leading_zero_bits(&hash) >= u32::from(difficulty) {
            tracing::debug!(height, nonce, difficulty, "sortition succeeded");
            return Ok(nonce);
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// Re-check the predicate for a declared nonce.
pub fn validate_proof_of_stake(
    difficulty: u8,
    prev_proofs: &[CommitmentProof],
    height: u32,
    balance: u64,
    commitment_proof: &CommitmentProof,
    nonce: u64,
) -> bool {
    let hash = sortition_hash(nonce, prev_proofs, height, balance, commitment_proof);
    leading_zero_bits(&hash) >= u32::from(difficulty)
}
