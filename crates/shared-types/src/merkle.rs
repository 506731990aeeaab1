//! Merkle root over a block's transaction-hash sequences.
//!
//! Leaves are the tx hashes concatenated in the fixed category order
//! acc → funds → config → stake → agg → iot. Parents hash the concatenation
//! of their children; an odd node at any level is paired with itself.

use sha3::{Digest, Sha3_256};

use crate::entities::{Block, Hash, EMPTY_HASH};

/// Compute the merkle root of a block's tx-hash sequences.
///
/// An empty block yields the all-zero root.
pub fn merkle_root(block: &Block) -> Hash {
    let mut leaves: Vec<Hash> = Vec::with_capacity(block.total_tx_count());
    leaves.extend_from_slice(&block.acc_tx_data);
    leaves.extend_from_slice(&block.funds_tx_data);
    leaves.extend_from_slice(&block.config_tx_data);
    leaves.extend_from_slice(&block.stake_tx_data);
    leaves.extend_from_slice(&block.agg_tx_data);
    leaves.extend_from_slice(&block.iot_tx_data);
    root_of(leaves)
}

fn root_of(mut level: Vec<Hash>) -> Hash {
    if level.is_empty() {
        return EMPTY_HASH;
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            let mut hasher = Sha3_256::new();
            hasher.update(pair[0]);
            hasher.update(right);
            next.push(hasher.finalize().into());
        }
        level = next;
    }

    level[0]
}
