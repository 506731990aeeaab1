//! Branch resolution: locating an incoming block relative to the head.
//!
//! Walks back from the incoming block until an ancestor is found in closed
//! storage, fetching unknown ancestors from open storage or peers. The
//! stretch between the head and that ancestor is the rollback list; the
//! fetched chain (ancestor-exclusive, oldest first) is the validation list.

use ob_01_storage::BlockStore;
use ob_03_tx_fetch::{fetch_block, PeerChannels, PeerNetwork};
use shared_types::Block;

use crate::error::{Result, ValidationError};

/// Ordered `(blocks_to_rollback, blocks_to_validate)` for an incoming block.
///
/// `blocks_to_rollback` runs head-first down to (exclusive of) the common
/// ancestor; `blocks_to_validate` runs oldest-first up to the incoming
/// block.
pub async fn block_sequences<B, P>(
    block_store: &B,
    peer: &P,
    channels: &PeerChannels,
    head: &Block,
    incoming: &Block,
) -> Result<(Vec<Block>, Vec<Block>)>
where
    B: BlockStore,
    P: PeerNetwork,
{
    let mut to_validate = vec![incoming.clone()];
    let mut cursor = incoming.clone();

    // Find the branch point.
    let ancestor = loop {
        if let Some(parent) = block_store
            .read_closed_block(&cursor.prev_hash)
            .or_else(|| block_store.read_closed_block_without_tx(&cursor.prev_hash_without_tx))
        {
            break parent;
        }
        if cursor.height == 0 {
            return Err(ValidationError::NoCommonAncestor);
        }

        let parent = match block_store.read_open_block(&cursor.prev_hash) {
            Some(parent) => parent,
            None => {
                tracing::debug!(
                    height = cursor.height.saturating_sub(1),
                    "fetching missing ancestor from peers"
                );
                fetch_block(peer, channels, cursor.prev_hash, cursor.prev_hash_without_tx).await?
            }
        };
        to_validate.push(parent.clone());
        cursor = parent;
    };
    to_validate.reverse();

    // Unwind the current chain down to the branch point.
    let mut to_rollback = Vec::new();
    let mut walker = head.clone();
    while walker.hash != ancestor.hash && walker.hash_without_tx != ancestor.hash_without_tx {
        to_rollback.push(walker.clone());
        walker = block_store
            .read_closed_block(&walker.prev_hash)
            .ok_or(ValidationError::ClosedChainBroken(walker.prev_hash))?;
    }

    Ok((to_rollback, to_validate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ob_01_storage::InMemoryBlockStore;
    use ob_03_tx_fetch::{peer_channels, InMemoryPeer};

    fn child_of(parent: &Block, height: u32, salt: u8) -> Block {
        let mut block = Block::new(parent.hash, parent.hash_without_tx, [salt; 256], height);
        block.seal(2_000_000 + height as u64 + salt as u64);
        block
    }

    fn chain(store: &InMemoryBlockStore, length: u32) -> Vec<Block> {
        let mut genesis = Block::new([0u8; 32], [0u8; 32], [0u8; 256], 0);
        genesis.seal(1_000_000);
        store.write_closed_block(genesis.clone());
        let mut blocks = vec![genesis];
        for height in 1..=length {
            let block = child_of(&blocks[height as usize - 1], height, 0);
            store.write_closed_block(block.clone());
            blocks.push(block);
        }
        blocks
    }

    #[tokio::test]
    async fn test_direct_child_needs_no_rollback() {
        let store = InMemoryBlockStore::new();
        let blocks = chain(&store, 3);
        let head = &blocks[3];
        let incoming = child_of(head, 4, 1);

        let (senders, channels) = peer_channels(4);
        let peer = InMemoryPeer::new(senders);
        let (rollback, validate) = block_sequences(&store, &peer, &channels, head, &incoming)
            .await
            .unwrap();
        assert!(rollback.is_empty());
        assert_eq!(validate, vec![incoming]);
    }

    #[tokio::test]
    async fn test_competing_branch_rolls_back_to_fork_point() {
        let store = InMemoryBlockStore::new();
        let blocks = chain(&store, 5);
        let head = &blocks[5];

        // A competing branch forks at height 3.
        let other4 = child_of(&blocks[3], 4, 7);
        let other5 = child_of(&other4, 5, 7);
        store.write_open_block(other4.clone());

        let (senders, channels) = peer_channels(4);
        let peer = InMemoryPeer::new(senders);
        let (rollback, validate) = block_sequences(&store, &peer, &channels, head, &other5)
            .await
            .unwrap();

        assert_eq!(
            rollback.iter().map(|b| b.height).collect::<Vec<_>>(),
            vec![5, 4]
        );
        assert_eq!(validate, vec![other4, other5]);
    }

    #[tokio::test]
    async fn test_missing_ancestor_is_fetched_from_peers() {
        let store = InMemoryBlockStore::new();
        let blocks = chain(&store, 2);
        let head = &blocks[2];

        let other1 = child_of(&blocks[1], 2, 9);
        let other2 = child_of(&other1, 3, 9);

        let (senders, channels) = peer_channels(4);
        let peer = InMemoryPeer::new(senders);
        peer.add_known_block(other1.hash, other1.encode().unwrap());

        let (rollback, validate) = block_sequences(&store, &peer, &channels, head, &other2)
            .await
            .unwrap();
        assert_eq!(rollback.iter().map(|b| b.height).collect::<Vec<_>>(), vec![2]);
        assert_eq!(validate, vec![other1, other2]);
    }

    #[tokio::test]
    async fn test_foreign_genesis_has_no_ancestor() {
        let store = InMemoryBlockStore::new();
        let blocks = chain(&store, 1);
        let mut foreign = Block::new([9u8; 32], [9u8; 32], [0u8; 256], 0);
        foreign.seal(123);

        let (senders, channels) = peer_channels(4);
        let peer = InMemoryPeer::new(senders);
        let result = block_sequences(&store, &peer, &channels, &blocks[1], &foreign).await;
        assert!(matches!(result, Err(ValidationError::NoCommonAncestor)));
    }
}
