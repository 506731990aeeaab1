//! Fetching whole blocks from peers.
//!
//! Used when branch resolution or a slashing proof references a block the
//! local stores do not hold.

use shared_types::{Block, Hash, BLOCKFETCH_TIMEOUT};
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{FetchError, Result};
use crate::ports::{PeerChannels, PeerNetwork};

/// Request a block by its hashes and wait for the encoded response.
pub async fn fetch_block<P: PeerNetwork>(
    peer: &P,
    channels: &PeerChannels,
    hash: Hash,
    hash_without_tx: Hash,
) -> Result<Block> {
    peer.request_block(hash, hash_without_tx).await?;

    let mut receiver = channels.block_receiver().lock().await;
    let encoded = match timeout(Duration::from_secs(BLOCKFETCH_TIMEOUT), receiver.recv()).await {
        Ok(Some(encoded)) => encoded,
        Ok(None) => return Err(FetchError::BadBlock("block channel closed".into())),
        Err(_) => {
            tracing::warn!(hash = %hex::encode(&hash[..8]), "block fetch timed out");
            return Err(FetchError::BlockTimeout);
        }
    };
    drop(receiver);

    let block = Block::decode(&encoded).map_err(|e| FetchError::BadBlock(e.to_string()))?;
    if block.hash != hash && block.hash_without_tx != hash_without_tx {
        return Err(FetchError::BadBlock(
            "fetched block matches neither requested hash".into(),
        ));
    }
    Ok(block)
}
