//! The before-aggregation pool.
//!
//! Funds transactions accepted into a candidate block wait here until the
//! aggregation pass folds them into aggregate records (or emits them
//! unchanged). The pool keeps occurrence tallies per sender and per
//! receiver; the aggregation pass always picks whichever single address
//! currently covers the most pending transactions.
//!
//! Callers guard the pool with the assembler's own mutex; there is no
//! internal locking.

use shared_types::{Address, FundsTx, Hash};
use std::collections::HashMap;

/// Pending funds transactions plus sender/receiver tallies.
#[derive(Debug, Default)]
pub struct PreAggregationPool {
    txs: HashMap<Hash, FundsTx>,
    different_senders: HashMap<Address, u32>,
    different_receivers: HashMap<Address, u32>,
}

impl PreAggregationPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a funds transaction, counting its sender and receiver.
    pub fn insert(&mut self, tx: FundsTx) {
        *self.different_senders.entry(tx.from).or_insert(0) += 1;
        *self.different_receivers.entry(tx.to).or_insert(0) += 1;
        self.txs.insert(tx.hash(), tx);
    }

    /// All pending transactions, in no particular order.
    pub fn read_all(&self) -> Vec<FundsTx> {
        self.txs.values().cloned().collect()
    }

    /// Remove a single transaction by hash.
    pub fn delete(&mut self, hash: &Hash) {
        self.txs.remove(hash);
    }

    /// Remove a transaction and decrement both of its tallies.
    pub fn remove_counted(&mut self, hash: &Hash) {
        if let Some(tx) = self.txs.remove(hash) {
            decrement(&mut self.different_senders, &tx.from);
            decrement(&mut self.different_receivers, &tx.to);
        }
    }

    /// Drop every pending transaction and all tallies.
    pub fn clear(&mut self) {
        self.txs.clear();
        self.different_senders.clear();
        self.different_receivers.clear();
    }

    /// Whether no transactions are pending.
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// The sender covering the most pending transactions, with its tally.
    pub fn max_sender(&self) -> (u32, Address) {
        max_entry(&self.different_senders)
    }

    /// The receiver covering the most pending transactions, with its tally.
    pub fn max_receiver(&self) -> (u32, Address) {
        max_entry(&self.different_receivers)
    }
}

fn decrement(tallies: &mut HashMap<Address, u32>, key: &Address) {
    if let Some(count) = tallies.get_mut(key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            tallies.remove(key);
        }
    }
}

fn max_entry(tallies: &HashMap<Address, u32>) -> (u32, Address) {
    let mut max = 0u32;
    let mut best = [0u8; 32];
    for (addr, count) in tallies {
        if *count > max {
            max = *count;
            best = *addr;
        }
    }
    (max, best)
}
