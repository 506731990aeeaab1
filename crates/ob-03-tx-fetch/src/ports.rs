//! Peer network port and response channels.
//!
//! Requests are fire-and-forget; responses arrive on one channel per
//! transaction category plus one for blocks. The fetchers lock a category's
//! receiver for the duration of a wait, which also serializes competing
//! consumers of the same category.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use shared_types::{FundsTx, Hash, Transaction, TxCategory};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;

/// Outbound peer operations consumed by the miner core.
#[async_trait]
pub trait PeerNetwork: Send + Sync {
    /// Ask the network for a transaction; the payload arrives on the
    /// category's response channel.
    async fn request_tx(&self, hash: Hash, category: TxCategory) -> Result<()>;

    /// Ask the network for a block by both of its hashes; the encoded block
    /// arrives on the block response channel.
    async fn request_block(&self, hash: Hash, hash_without_tx: Hash) -> Result<()>;

    /// Re-broadcast funds transactions that just became part of a validated
    /// block.
    async fn broadcast_verified_txs(&self, txs: Vec<FundsTx>);

    /// Network-synchronized unix time used for timestamp bounds checking.
    fn system_time(&self) -> i64;
}

/// Receiver side of the per-category response channels.
pub struct PeerChannels {
    acc: Mutex<mpsc::Receiver<Transaction>>,
    funds: Mutex<mpsc::Receiver<Transaction>>,
    config: Mutex<mpsc::Receiver<Transaction>>,
    stake: Mutex<mpsc::Receiver<Transaction>>,
    agg: Mutex<mpsc::Receiver<Transaction>>,
    iot: Mutex<mpsc::Receiver<Transaction>>,
    block: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl PeerChannels {
    /// The receiver for a transaction category.
    pub fn receiver(&self, category: TxCategory) -> &Mutex<mpsc::Receiver<Transaction>> {
        match category {
            TxCategory::Acc => &self.acc,
            TxCategory::Funds => &self.funds,
            TxCategory::Config => &self.config,
            TxCategory::Stake => &self.stake,
            TxCategory::Agg => &self.agg,
            TxCategory::Iot => &self.iot,
        }
    }

    /// The receiver for block responses.
    pub fn block_receiver(&self) -> &Mutex<mpsc::Receiver<Vec<u8>>> {
        &self.block
    }
}

/// Sender side of the response channels, held by the transport adapter.
#[derive(Clone)]
pub struct PeerSenders {
    acc: mpsc::Sender<Transaction>,
    funds: mpsc::Sender<Transaction>,
    config: mpsc::Sender<Transaction>,
    stake: mpsc::Sender<Transaction>,
    agg: mpsc::Sender<Transaction>,
    iot: mpsc::Sender<Transaction>,
    block: mpsc::Sender<Vec<u8>>,
}

impl PeerSenders {
    /// Deliver a transaction response on its category channel.
    pub async fn deliver_tx(&self, category: TxCategory, tx: Transaction) {
        let sender = match category {
            TxCategory::Acc => &self.acc,
            TxCategory::Funds => &self.funds,
            TxCategory::Config => &self.config,
            TxCategory::Stake => &self.stake,
            TxCategory::Agg => &self.agg,
            TxCategory::Iot => &self.iot,
        };
        // A dropped receiver only means the miner stopped listening.
        let _ = sender.send(tx).await;
    }

    /// Deliver an encoded block response.
    pub async fn deliver_block(&self, encoded: Vec<u8>) {
        let _ = self.block.send(encoded).await;
    }
}

/// Create the paired sender/receiver sides of all response channels.
pub fn peer_channels(capacity: usize) -> (PeerSenders, PeerChannels) {
    let (acc_tx, acc_rx) = mpsc::channel(capacity);
    let (funds_tx, funds_rx) = mpsc::channel(capacity);
    let (config_tx, config_rx) = mpsc::channel(capacity);
    let (stake_tx, stake_rx) = mpsc::channel(capacity);
    let (agg_tx, agg_rx) = mpsc::channel(capacity);
    let (iot_tx, iot_rx) = mpsc::channel(capacity);
    let (block_tx, block_rx) = mpsc::channel(capacity);

    (
        PeerSenders {
            acc: acc_tx,
            funds: funds_tx,
            config: config_tx,
            stake: stake_tx,
            agg: agg_tx,
            iot: iot_tx,
            block: block_tx,
        },
        PeerChannels {
            acc: Mutex::new(acc_rx),
            funds: Mutex::new(funds_rx),
            config: Mutex::new(config_rx),
            stake: Mutex::new(stake_rx),
            agg: Mutex::new(agg_rx),
            iot: Mutex::new(iot_rx),
            block: Mutex::new(block_rx),
        },
    )
}

/// Test adapter: answers requests from a preloaded map of transactions and
/// blocks, and records broadcasts.
pub struct InMemoryPeer {
    senders: PeerSenders,
    known_txs: SyncMutex<HashMap<Hash, Transaction>>,
    known_blocks: SyncMutex<HashMap<Hash, Vec<u8>>>,
    broadcasts: SyncMutex<Vec<FundsTx>>,
    time: SyncMutex<i64>,
}

impl InMemoryPeer {
    /// Create a peer that knows nothing yet.
    pub fn new(senders: PeerSenders) -> Self {
        Self {
            senders,
            known_txs: SyncMutex::new(HashMap::new()),
            known_blocks: SyncMutex::new(HashMap::new()),
            broadcasts: SyncMutex::new(Vec::new()),
            time: SyncMutex::new(0),
        }
    }

    /// Make a transaction available for future requests.
    pub fn add_known_tx(&self, tx: Transaction) {
        self.known_txs.lock().insert(tx.hash(), tx);
    }

    /// Make a transaction retrievable under an arbitrary hash.
    ///
    /// Simulates a malicious peer answering with a payload that does not
    /// match the request.
    pub fn add_known_tx_as(&self, hash: Hash, tx: Transaction) {
        self.known_txs.lock().insert(hash, tx);
    }

    /// Make an encoded block available for future requests.
    pub fn add_known_block(&self, hash: Hash, encoded: Vec<u8>) {
        self.known_blocks.lock().insert(hash, encoded);
    }

    /// Funds transactions re-broadcast so far.
    pub fn broadcast_log(&self) -> Vec<FundsTx> {
        self.broadcasts.lock().clone()
    }

    /// Fix the reported network time.
    pub fn set_system_time(&self, now: i64) {
        *self.time.lock() = now;
    }
}

#[async_trait]
impl PeerNetwork for InMemoryPeer {
    async fn request_tx(&self, hash: Hash, category: TxCategory) -> Result<()> {
        let known = self.known_txs.lock().get(&hash).cloned();
        if let Some(tx) = known {
            self.senders.deliver_tx(category, tx).await;
        }
        // An unknown hash is not an error; the requester runs into its
        // timeout instead, like on the real network.
        Ok(())
    }

    async fn request_block(&self, hash: Hash, hash_without_tx: Hash) -> Result<()> {
        let known = {
            let blocks = self.known_blocks.lock();
            blocks
                .get(&hash)
                .or_else(|| blocks.get(&hash_without_tx))
                .cloned()
        };
        if let Some(encoded) = known {
            self.senders.deliver_block(encoded).await;
        }
        Ok(())
    }

    async fn broadcast_verified_txs(&self, txs: Vec<FundsTx>) {
        self.broadcasts.lock().extend(txs);
    }

    fn system_time(&self) -> i64 {
        *self.time.lock()
    }
}
