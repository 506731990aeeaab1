//! Double-sign detection and slashing proof verification.
//!
//! The detector watches every block passing validation: two blocks by the
//! same beneficiary at heights within the slashing window, sitting on
//! different chains, yield a proof in the shared slashing dictionary. The
//! next sealed block consumes one proof; verification on the receiving side
//! re-resolves both conflicting blocks and re-checks chain membership and
//! the window.

use ob_01_storage::BlockStore;
use ob_03_tx_fetch::{fetch_block, PeerChannels, PeerNetwork};
use parking_lot::Mutex;
use shared_types::{Address, Block, Hash, SlashingDict, SlashingProof, EMPTY_HASH};
use std::collections::HashMap;

use crate::error::{Result, ValidationError};

/// Whether two resolved blocks lie on the same chain, decided by walking
/// the higher one's ancestry down to the lower one's height.
pub fn is_in_same_chain<B: BlockStore>(store: &B, a: &Block, b: &Block) -> bool {
    let (lower, upper) = if a.height <= b.height { (a, b) } else { (b, a) };

    let mut cursor = upper.clone();
    while cursor.height > lower.height {
        let parent = store
            .read_closed_block(&cursor.prev_hash)
            .or_else(|| store.read_closed_block_without_tx(&cursor.prev_hash_without_tx))
            .or_else(|| store.read_open_block(&cursor.prev_hash));
        match parent {
            Some(parent) => cursor = parent,
            // An unresolvable ancestry cannot prove same-chain membership.
            None => return false,
        }
    }
    cursor.hash == lower.hash || cursor.hash_without_tx == lower.hash_without_tx
}

#[derive(Clone, Copy, Debug)]
struct BlockRecord {
    height: u32,
    hash: Hash,
    hash_without_tx: Hash,
}

/// Watches validated blocks for double-signs within the slashing window.
#[derive(Debug, Default)]
pub struct SlashingDetector {
    records: HashMap<Address, Vec<BlockRecord>>,
}

impl SlashingDetector {
    /// Create an empty detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a block; on a detected double-sign, store a proof against
    /// the beneficiary in the dictionary.
    pub fn seek_slashing_proof<B: BlockStore>(
        &mut self,
        block: &Block,
        store: &B,
        window: u64,
        dict: &mut SlashingDict,
    ) {
        let seen = self.records.entry(block.beneficiary).or_default();

        for record in seen.iter() {
            if record.hash == block.hash {
                continue;
            }
            let height_diff = record.height.abs_diff(block.height) as u64;
            if height_diff >= window {
                continue;
            }
            let Some(recorded) = resolve(store, &record.hash, &record.hash_without_tx) else {
                continue;
            };
            if is_in_same_chain(store, &recorded, block) {
                continue;
            }

            tracing::warn!(
                beneficiary = %hex::encode(&block.beneficiary[..8]),
                h1 = record.height,
                h2 = block.height,
                "double-sign detected, storing slashing proof"
            );
            dict.insert(
                block.beneficiary,
                SlashingProof {
                    conflicting_block_hash1: record.hash,
                    conflicting_block_hash2: block.hash,
                    conflicting_block_hash_without_tx1: record.hash_without_tx,
                    conflicting_block_hash_without_tx2: block.hash_without_tx,
                },
            );
            break;
        }

        seen.push(BlockRecord {
            height: block.height,
            hash: block.hash,
            hash_without_tx: block.hash_without_tx,
        });
        // Records beyond the window can never conflict again.
        let horizon = block.height.saturating_sub(window as u32);
        seen.retain(|record| record.height >= horizon);
    }
}

fn resolve<B: BlockStore>(store: &B, hash: &Hash, hash_without_tx: &Hash) -> Option<Block> {
    store
        .read_closed_block(hash)
        .or_else(|| store.read_closed_block_without_tx(hash_without_tx))
        .or_else(|| store.read_open_block(hash))
}

/// Verify the slashing triple a block carries, consuming any local
/// dictionary entry for the slashed address on success.
#[allow(clippy::too_many_arguments)]
pub async fn slashing_check<B, P>(
    store: &B,
    peer: &P,
    channels: &PeerChannels,
    slashed_address: Address,
    proof: SlashingProof,
    window: u64,
    dict: &Mutex<SlashingDict>,
) -> Result<()>
where
    B: BlockStore,
    P: PeerNetwork,
{
    let SlashingProof {
        conflicting_block_hash1: hash1,
        conflicting_block_hash2: hash2,
        conflicting_block_hash_without_tx1: hash_without_tx1,
        conflicting_block_hash_without_tx2: hash_without_tx2,
    } = proof;

    if hash1 == EMPTY_HASH || hash2 == EMPTY_HASH {
        return Err(ValidationError::SlashingProofInvalid(
            "invalid conflicting block hashes provided".into(),
        ));
    }
    if hash1 == hash2 {
        return Err(ValidationError::SlashingProofInvalid(
            "conflicting block hashes are the same".into(),
        ));
    }

    let block1 = match resolve(store, &hash1, &hash_without_tx1) {
        Some(block) => block,
        None => fetch_block(peer, channels, hash1, hash_without_tx1)
            .await
            .map_err(|_| {
                ValidationError::SlashingProofInvalid(
                    "could not find a block for the first conflicting hash".into(),
                )
            })?,
    };
    let block2 = match resolve(store, &hash2, &hash_without_tx2) {
        Some(block) => block,
        None => fetch_block(peer, channels, hash2, hash_without_tx2)
            .await
            .map_err(|_| {
                ValidationError::SlashingProofInvalid(
                    "could not find a block for the second conflicting hash".into(),
                )
            })?,
    };

    if is_in_same_chain(store, &block1, &block2) {
        return Err(ValidationError::SlashingProofInvalid(
            "conflicting blocks are on the same chain".into(),
        ));
    }

    if !((block1.height as u64) < window + block2.height as u64) {
        return Err(ValidationError::SlashingProofInvalid(
            "conflicting blocks are outside the slashing window".into(),
        ));
    }

    // The proof is spent; a local entry for the same offender goes away.
    dict.lock().remove(&slashed_address);
    Ok(())
}
