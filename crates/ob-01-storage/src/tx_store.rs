//! Transaction stores: open, invalid, closed.

use parking_lot::RwLock;
use shared_types::{Hash, Transaction};
use std::collections::HashMap;

/// Abstract interface over the three content-addressed transaction stores.
///
/// Production: persistent KV buckets. Testing: [`InMemoryTxStore`].
pub trait TxStore: Send + Sync {
    /// Store a transaction in open storage under its canonical hash.
    fn write_open_tx(&self, tx: Transaction);

    /// Look up an open transaction.
    fn read_open_tx(&self, hash: &Hash) -> Option<Transaction>;

    /// Remove a transaction from open storage.
    fn delete_open_tx(&self, hash: &Hash);

    /// Store a transaction that failed verification on receipt.
    fn write_invalid_open_tx(&self, tx: Transaction);

    /// Look up a transaction in the invalid stash.
    fn read_invalid_open_tx(&self, hash: &Hash) -> Option<Transaction>;

    /// Remove a transaction from the invalid stash.
    fn delete_invalid_open_tx(&self, hash: &Hash);

    /// Store a transaction included in a validated block.
    fn write_closed_tx(&self, tx: Transaction);

    /// Look up a closed transaction.
    fn read_closed_tx(&self, hash: &Hash) -> Option<Transaction>;

    /// Remove a transaction from closed storage (rollback path).
    fn delete_closed_tx(&self, hash: &Hash);
}

/// In-memory transaction stores for tests and single-process runs.
#[derive(Default)]
pub struct InMemoryTxStore {
    open: RwLock<HashMap<Hash, Transaction>>,
    invalid: RwLock<HashMap<Hash, Transaction>>,
    closed: RwLock<HashMap<Hash, Transaction>>,
}

impl InMemoryTxStore {
    /// Create empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions currently in open storage.
    pub fn open_count(&self) -> usize {
        self.open.read().len()
    }

    /// Number of transactions currently in closed storage.
    pub fn closed_count(&self) -> usize {
        self.closed.read().len()
    }
}

impl TxStore for InMemoryTxStore {
    fn write_open_tx(&self, tx: Transaction) {
        self.open.write().insert(tx.hash(), tx);
    }

    fn read_open_tx(&self, hash: &Hash) -> Option<Transaction> {
        self.open.read().get(hash).cloned()
    }

    fn delete_open_tx(&self, hash: &Hash) {
        self.open.write().remove(hash);
    }

    fn write_invalid_open_tx(&self, tx: Transaction) {
        self.invalid.write().insert(tx.hash(), tx);
    }

    fn read_invalid_open_tx(&self, hash: &Hash) -> Option<Transaction> {
        self.invalid.read().get(hash).cloned()
    }

    fn delete_invalid_open_tx(&self, hash: &Hash) {
        self.invalid.write().remove(hash);
    }

    fn write_closed_tx(&self, tx: Transaction) {
        self.closed.write().insert(tx.hash(), tx);
    }

    fn read_closed_tx(&self, hash: &Hash) -> Option<Transaction> {
        self.closed.read().get(hash).cloned()
    }

    fn delete_closed_tx(&self, hash: &Hash) {
        self.closed.write().remove(hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::FundsTx;

    fn tx(amount: u64) -> Transaction {
        Transaction::Funds(FundsTx {
            header: 0,
            amount,
            fee: 1,
            tx_cnt: 0,
            from: [1u8; 32],
            to: [2u8; 32],
            sig: [0u8; 64],
            aggregated: false,
            data: Vec::new(),
        })
    }

    #[test]
    fn test_open_close_lifecycle() {
        let store = InMemoryTxStore::new();
        let tx = tx(100);
        let hash = tx.hash();

        store.write_open_tx(tx.clone());
        assert_eq!(store.read_open_tx(&hash), Some(tx.clone()));

        store.delete_open_tx(&hash);
        store.write_closed_tx(tx.clone());
        assert!(store.read_open_tx(&hash).is_none());
        assert_eq!(store.read_closed_tx(&hash), Some(tx));
    }

    #[test]
    fn test_invalid_stash_is_separate() {
        let store = InMemoryTxStore::new();
        let tx = tx(7);
        let hash = tx.hash();
        store.write_invalid_open_tx(tx);
        assert!(store.read_open_tx(&hash).is_none());
        assert!(store.read_invalid_open_tx(&hash).is_some());
        store.delete_invalid_open_tx(&hash);
        assert!(store.read_invalid_open_tx(&hash).is_none());
    }
}
