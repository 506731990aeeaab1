//! Block stores: open, closed, and the compacted without-tx form.

use parking_lot::RwLock;
use shared_types::{Block, CommitmentProof, Hash};
use std::collections::HashMap;

use crate::error::{Result, StorageError};

/// Abstract interface over block storage.
///
/// Closed blocks are keyed by their final hash; compacted blocks by their
/// without-tx hash, so the without-tx chain stays walkable after
/// compaction.
pub trait BlockStore: Send + Sync {
    /// Store a block received from the network but not yet validated.
    fn write_open_block(&self, block: Block);

    /// Look up an open block.
    fn read_open_block(&self, hash: &Hash) -> Option<Block>;

    /// Remove a block from open storage.
    fn delete_open_block(&self, hash: &Hash);

    /// Store a validated block.
    fn write_closed_block(&self, block: Block);

    /// Look up a closed block by its final hash.
    fn read_closed_block(&self, hash: &Hash) -> Option<Block>;

    /// Remove a block from closed storage (rollback path).
    fn delete_closed_block(&self, hash: &Hash);

    /// Look up a compacted block by its without-tx hash.
    fn read_closed_block_without_tx(&self, hash: &Hash) -> Option<Block>;

    /// All blocks currently in closed storage, in no particular order.
    fn read_all_closed_blocks(&self) -> Vec<Block>;

    /// Compact a closed block: drop its tx-hash sequences and re-key it by
    /// its without-tx hash.
    fn update_block_to_block_without_tx(&self, hash: &Hash) -> Result<()>;

    /// Commitment proofs of up to `n` ancestors of `block`, nearest first.
    ///
    /// Walks the parent chain through closed storage, falling back to the
    /// compacted store for ancestors that were already stripped. Stops early
    /// when the chain runs out locally.
    fn latest_proofs(&self, n: usize, block: &Block) -> Vec<CommitmentProof> {
        let mut proofs = Vec::with_capacity(n);
        let mut prev_hash = block.prev_hash;
        let mut prev_hash_without_tx = block.prev_hash_without_tx;

        while proofs.len() < n {
            let ancestor = match self
                .read_closed_block(&prev_hash)
                .or_else(|| self.read_closed_block_without_tx(&prev_hash_without_tx))
            {
                Some(block) => block,
                None => break,
            };
            proofs.push(ancestor.commitment_proof);
            if ancestor.height == 0 {
                break;
            }
            prev_hash = ancestor.prev_hash;
            prev_hash_without_tx = ancestor.prev_hash_without_tx;
        }

        proofs
    }
}

/// In-memory block stores for tests and single-process runs.
#[derive(Default)]
pub struct InMemoryBlockStore {
    open: RwLock<HashMap<Hash, Block>>,
    closed: RwLock<HashMap<Hash, Block>>,
    without_tx: RwLock<HashMap<Hash, Block>>,
}

impl InMemoryBlockStore {
    /// Create empty stores.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn write_open_block(&self, block: Block) {
        self.open.write().insert(block.hash, block);
    }

    fn read_open_block(&self, hash: &Hash) -> Option<Block> {
        self.open.read().get(hash).cloned()
    }

    fn delete_open_block(&self, hash: &Hash) {
        self.open.write().remove(hash);
    }

    fn write_closed_block(&self, block: Block) {
        self.closed.write().insert(block.hash, block);
    }

    fn read_closed_block(&self, hash: &Hash) -> Option<Block> {
        self.closed.read().get(hash).cloned()
    }

    fn delete_closed_block(&self, hash: &Hash) {
        self.closed.write().remove(hash);
    }

    fn read_closed_block_without_tx(&self, hash: &Hash) -> Option<Block> {
        self.without_tx.read().get(hash).cloned()
    }

    fn read_all_closed_blocks(&self) -> Vec<Block> {
        self.closed.read().values().cloned().collect()
    }

    fn update_block_to_block_without_tx(&self, hash: &Hash) -> Result<()> {
        let block = self
            .closed
            .write()
            .remove(hash)
            .ok_or(StorageError::BlockNotFound(*hash))?;
        let stripped = block.to_block_without_tx();
        tracing::debug!(height = stripped.height, "block compacted to without-tx form");
        self.without_tx
            .write()
            .insert(stripped.hash_without_tx, stripped);
        Ok(())
    }
}
