//! The aggregation pass over the before-aggregation pool.

use ob_01_storage::{PreAggregationPool, TxStore};
use shared_types::{AggTx, Block, FundsTx, Transaction};

use crate::error::{AggregationError, Result};

/// Fold every pending funds transaction into the candidate block.
///
/// Groups of two or more become an aggregate record whose hash lands in the
/// block's agg sequence; singleton groups stay ordinary funds transactions.
/// Members are marked aggregated in open storage so the block's funds
/// sequence and the aggregate records never overlap.
pub fn aggregate_pending(
    pool: &mut PreAggregationPool,
    block: &mut Block,
    tx_store: &dyn TxStore,
    fee_minimum: u64,
) -> Result<()> {
    while !pool.is_empty() {
        let (max_sender, sender) = pool.max_sender();
        let (max_receiver, receiver) = pool.max_receiver();
        if max_sender == 0 && max_receiver == 0 {
            return Err(AggregationError::EmptySelection);
        }

        // The busier side wins; ties go to the sender.
        let by_sender = max_sender >= max_receiver;
        let mut group: Vec<FundsTx> = pool
            .read_all()
            .into_iter()
            .filter(|tx| {
                if by_sender {
                    tx.from == sender
                } else {
                    tx.to == receiver
                }
            })
            .collect();
        if group.is_empty() {
            // A tally pointing at an address with no pending transactions
            // means the pool and its counters diverged.
            return Err(AggregationError::EmptySelection);
        }
        for tx in &group {
            pool.remove_counted(&tx.hash());
        }

        // Replay order: sender bytes, then counter.
        group.sort_by_key(|tx| (tx.from, tx.tx_cnt));

        if group.len() > 1 {
            let agg = build_agg_tx(&group, fee_minimum)?;
            tracing::debug!(
                members = group.len(),
                amount = agg.amount,
                by_sender,
                "aggregated funds transactions"
            );
            for mut member in group {
                member.aggregated = true;
                tx_store.write_open_tx(Transaction::Funds(member));
            }
            block.agg_tx_data.push(agg.hash());
            tx_store.write_open_tx(Transaction::Agg(agg));
        } else if let Some(tx) = group.pop() {
            block.funds_tx_data.push(tx.hash());
        }
    }

    pool.clear();
    Ok(())
}

fn build_agg_tx(group: &[FundsTx], fee_minimum: u64) -> Result<AggTx> {
    let mut amount: u64 = 0;
    let mut senders = Vec::new();
    let mut receivers = Vec::new();
    let mut member_hashes = Vec::with_capacity(group.len());

    for tx in group {
        amount = amount
            .checked_add(tx.amount)
            .ok_or(AggregationError::AmountOverflow)?;
        if !senders.contains(&tx.from) {
            senders.push(tx.from);
        }
        if !receivers.contains(&tx.to) {
            receivers.push(tx.to);
        }
        member_hashes.push(tx.hash());
    }

    // One common address per record: the sparser side collapses, never both.
    if senders.len() < receivers.len() {
        senders.truncate(1);
    } else {
        receivers.truncate(1);
    }

    Ok(AggTx {
        amount,
        fee: fee_minimum,
        from: senders,
        to: receivers,
        aggregated_tx_slice: member_hashes,
        aggregated: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ob_01_storage::InMemoryTxStore;

    fn funds_tx(from: u8, to: u8, amount: u64, tx_cnt: u32) -> FundsTx {
        FundsTx {
            header: 0,
            amount,
            fee: 1,
            tx_cnt,
            from: [from; 32],
            to: [to; 32],
            sig: [0u8; 64],
            aggregated: false,
            data: Vec::new(),
        }
    }

    #[test]
    fn test_shared_sender_group_becomes_one_agg_tx() {
        let mut pool = PreAggregationPool::new();
        let store = InMemoryTxStore::new();
        let mut block = Block::default();

        pool.insert(funds_tx(1, 2, 100, 0));
        pool.insert(funds_tx(1, 3, 200, 1));
        pool.insert(funds_tx(1, 4, 50, 2));

        aggregate_pending(&mut pool, &mut block, &store, 1).unwrap();

        assert_eq!(block.agg_tx_data.len(), 1);
        assert!(block.funds_tx_data.is_empty());
        assert!(pool.is_empty());

        let stored = store.read_open_tx(&block.agg_tx_data[0]).unwrap();
        match stored {
            Transaction::Agg(agg) => {
                assert_eq!(agg.amount, 350);
                assert_eq!(agg.fee, 1);
                assert_eq!(agg.from, vec![[1u8; 32]]);
                assert_eq!(agg.to.len(), 3);
                assert_eq!(agg.aggregated_tx_slice.len(), 3);
            }
            other => panic!("expected agg tx, got {other:?}"),
        }
    }

    #[test]
    fn test_singleton_group_stays_plain_funds_tx() {
        let mut pool = PreAggregationPool::new();
        let store = InMemoryTxStore::new();
        let mut block = Block::default();

        let lone = funds_tx(1, 2, 10, 0);
        let lone_hash = lone.hash();
        pool.insert(lone);

        aggregate_pending(&mut pool, &mut block, &store, 1).unwrap();
        assert_eq!(block.funds_tx_data, vec![lone_hash]);
        assert!(block.agg_tx_data.is_empty());
    }

    #[test]
    fn test_receiver_side_wins_when_busier() {
        let mut pool = PreAggregationPool::new();
        let store = InMemoryTxStore::new();
        let mut block = Block::default();

        // Three different senders pay the same receiver.
        pool.insert(funds_tx(1, 9, 10, 0));
        pool.insert(funds_tx(2, 9, 20, 0));
        pool.insert(funds_tx(3, 9, 30, 0));

        aggregate_pending(&mut pool, &mut block, &store, 1).unwrap();

        let stored = store.read_open_tx(&block.agg_tx_data[0]).unwrap();
        match stored {
            Transaction::Agg(agg) => {
                assert_eq!(agg.to, vec![[9u8; 32]]);
                assert_eq!(agg.from.len(), 3);
                assert_eq!(agg.amount, 60);
            }
            other => panic!("expected agg tx, got {other:?}"),
        }
    }

    #[test]
    fn test_members_sorted_by_sender_then_counter() {
        let mut pool = PreAggregationPool::new();
        let store = InMemoryTxStore::new();
        let mut block = Block::default();

        let second = funds_tx(1, 2, 20, 1);
        let first = funds_tx(1, 3, 10, 0);
        pool.insert(second.clone());
        pool.insert(first.clone());

        aggregate_pending(&mut pool, &mut block, &store, 1).unwrap();
        let stored = store.read_open_tx(&block.agg_tx_data[0]).unwrap();
        match stored {
            Transaction::Agg(agg) => {
                assert_eq!(agg.aggregated_tx_slice, vec![first.hash(), second.hash()]);
            }
            other => panic!("expected agg tx, got {other:?}"),
        }
    }

    #[test]
    fn test_members_marked_aggregated_in_open_storage() {
        let mut pool = PreAggregationPool::new();
        let store = InMemoryTxStore::new();
        let mut block = Block::default();

        let a = funds_tx(1, 2, 10, 0);
        let b = funds_tx(1, 3, 20, 1);
        let hashes = [a.hash(), b.hash()];
        pool.insert(a);
        pool.insert(b);

        aggregate_pending(&mut pool, &mut block, &store, 1).unwrap();
        for hash in hashes {
            match store.read_open_tx(&hash) {
                Some(Transaction::Funds(tx)) => assert!(tx.aggregated),
                other => panic!("member missing from open storage: {other:?}"),
            }
        }
    }

    #[test]
    fn test_mixed_pool_drains_completely() {
        let mut pool = PreAggregationPool::new();
        let store = InMemoryTxStore::new();
        let mut block = Block::default();

        pool.insert(funds_tx(1, 2, 10, 0));
        pool.insert(funds_tx(1, 3, 10, 1));
        pool.insert(funds_tx(5, 6, 10, 0));

        aggregate_pending(&mut pool, &mut block, &store, 1).unwrap();
        assert!(pool.is_empty());
        assert_eq!(block.agg_tx_data.len(), 1);
        assert_eq!(block.funds_tx_data.len(), 1);
    }
}
