//! Reversing a validated block during chain reorganization.
//!
//! The payloads of a closed block are reconstructed from closed storage and
//! every state effect is undone in the exact inverse of the application
//! order: staking height, slash reward, block reward, fees, iots, stakes,
//! aggregate members, funds, account changes.

use ob_01_storage::{StorageError, TxStore};
use ob_02_state::{transitions, GlobalState};
use ob_03_tx_fetch::BlockPayloads;
use shared_types::{Block, Hash, Parameters, Transaction};

use crate::error::{Result, ValidationError};

/// Rebuild a closed block's payloads from closed storage.
pub fn collect_closed_payloads<S: TxStore>(store: &S, block: &Block) -> Result<BlockPayloads> {
    let mut payloads = BlockPayloads::default();

    for hash in &block.acc_tx_data {
        match read_closed(store, hash)? {
            Transaction::Acc(tx) => payloads.accs.push(tx),
            _ => return Err(bad_category(hash)),
        }
    }
    for hash in &block.funds_tx_data {
        match read_closed(store, hash)? {
            Transaction::Funds(tx) => payloads.funds.push(tx),
            _ => return Err(bad_category(hash)),
        }
    }
    for hash in &block.config_tx_data {
        match read_closed(store, hash)? {
            Transaction::Config(tx) => payloads.configs.push(tx),
            _ => return Err(bad_category(hash)),
        }
    }
    for hash in &block.stake_tx_data {
        match read_closed(store, hash)? {
            Transaction::Stake(tx) => payloads.stakes.push(tx),
            _ => return Err(bad_category(hash)),
        }
    }
    for hash in &block.agg_tx_data {
        let agg = match read_closed(store, hash)? {
            Transaction::Agg(tx) => tx,
            _ => return Err(bad_category(hash)),
        };
        let mut members = Vec::with_capacity(agg.aggregated_tx_slice.len());
        for member_hash in &agg.aggregated_tx_slice {
            match read_closed(store, member_hash)? {
                Transaction::Funds(tx) => members.push(tx),
                _ => return Err(bad_category(member_hash)),
            }
        }
        payloads.aggs.push((agg, members));
    }
    for hash in &block.iot_tx_data {
        match read_closed(store, hash)? {
            Transaction::Iot(tx) => payloads.iots.push(tx),
            _ => return Err(bad_category(hash)),
        }
    }

    Ok(payloads)
}

fn read_closed<S: TxStore>(store: &S, hash: &Hash) -> Result<Transaction> {
    store
        .read_closed_tx(hash)
        .ok_or(ValidationError::Storage(StorageError::TxNotFound(*hash)))
}

fn bad_category(hash: &Hash) -> ValidationError {
    ValidationError::Storage(StorageError::TxNotFound(*hash))
}

/// Undo every state effect of a block, in exact inverse order.
pub fn reverse_block_effects(
    state: &mut GlobalState,
    params: &Parameters,
    block: &Block,
    payloads: &BlockPayloads,
    previous_staking_height: u32,
) {
    transitions::rollback_staking_height(state, block, previous_staking_height);
    transitions::rollback_slash_reward(state, params.slash_reward, block);
    transitions::rollback_block_reward(state, params.block_reward, &block.beneficiary);
    transitions::rollback_fees(state, payloads.fee_sum(), &block.beneficiary);
    transitions::rollback_iot_txs(state, &payloads.iots);
    transitions::rollback_stake_txs(state, &payloads.stakes);
    transitions::rollback_agg_txs(state, &payloads.aggs);
    transitions::rollback_funds_txs(state, &payloads.funds);
    transitions::rollback_acc_txs(state, &payloads.accs);
}
