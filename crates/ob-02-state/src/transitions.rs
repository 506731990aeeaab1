//! Category-ordered state transitions and their exact inverses.
//!
//! A block's effects apply in the fixed order accs → funds → aggs → stakes
//! → iots → fees → block reward → slash reward → staking height. Each
//! `apply_*` reverses its own partial effects before returning an error;
//! the matching `rollback_*` undoes a fully applied step. The validator
//! chains the rollbacks so that any failing step unwinds everything applied
//! before it, in exact inverse order.

use shared_types::{address_of, AccTx, Account, AggTx, Block, FundsTx, IotTx, StakeTx};
use shared_types::MAX_MONEY;

use crate::error::{Result, StateError};
use crate::global::GlobalState;

/// Create and remove accounts.
pub fn apply_acc_txs(state: &mut GlobalState, txs: &[AccTx]) -> Result<()> {
    for (idx, tx) in txs.iter().enumerate() {
        if let Err(err) = apply_acc_tx(state, tx) {
            rollback_acc_txs(state, &txs[..idx]);
            return Err(err);
        }
    }
    Ok(())
}

fn apply_acc_tx(state: &mut GlobalState, tx: &AccTx) -> Result<()> {
    let address = address_of(&tx.pub_key);
    if tx.is_removal() {
        state
            .delete(&address)
            .ok_or(StateError::UnknownAccount(address))?;
        return Ok(());
    }

    if state.contains(&address) {
        return Err(StateError::AccountAlreadyExists(address));
    }
    let mut account = Account::new(tx.pub_key);
    account.contract = tx.contract.clone();
    account.contract_variables = tx.contract_variables.clone();
    state.put(account);
    Ok(())
}

/// Inverse of [`apply_acc_txs`]: creations are deleted, removals recreated.
pub fn rollback_acc_txs(state: &mut GlobalState, txs: &[AccTx]) {
    for tx in txs.iter().rev() {
        let address = address_of(&tx.pub_key);
        if tx.is_removal() {
            state.put(Account::new(tx.pub_key));
        } else {
            state.delete(&address);
        }
    }
}

/// Move amounts and bump sender counters for a slice of funds transactions.
pub fn apply_funds_txs(state: &mut GlobalState, txs: &[FundsTx]) -> Result<()> {
    for (idx, tx) in txs.iter().enumerate() {
        if let Err(err) = apply_funds_tx(state, tx) {
            rollback_funds_txs(state, &txs[..idx]);
            return Err(err);
        }
    }
    Ok(())
}

fn apply_funds_tx(state: &mut GlobalState, tx: &FundsTx) -> Result<()> {
    let is_root = state.is_root(&tx.from);
    let sender = state.get_or_err(&tx.from)?;

    // Root accounts are exempt from the balance requirement.
    let required = tx.amount.saturating_add(tx.fee);
    if !is_root && sender.balance < required {
        return Err(StateError::InsufficientFunds {
            address: tx.from,
            balance: sender.balance,
            required,
        });
    }
    if sender.tx_cnt != tx.tx_cnt {
        return Err(StateError::TxCntMismatch {
            address: tx.from,
            expected: sender.tx_cnt,
            actual: tx.tx_cnt,
        });
    }

    let receiver = state.get_or_err(&tx.to)?;
    if receiver.balance.saturating_add(tx.amount) > MAX_MONEY {
        return Err(StateError::BalanceOverflow {
            address: tx.to,
            balance: receiver.balance,
            amount: tx.amount,
        });
    }

    let sender = state.get_mut(&tx.from)?;
    sender.balance = sender.balance.saturating_sub(required);
    sender.tx_cnt += 1;
    let receiver = state.get_mut(&tx.to)?;
    receiver.balance += tx.amount;
    Ok(())
}

/// Inverse of [`apply_funds_txs`], applied in reverse transaction order.
pub fn rollback_funds_txs(state: &mut GlobalState, txs: &[FundsTx]) {
    for tx in txs.iter().rev() {
        if let Ok(receiver) = state.get_mut(&tx.to) {
            receiver.balance = receiver.balance.saturating_sub(tx.amount);
        }
        if let Ok(sender) = state.get_mut(&tx.from) {
            sender.balance = sender
                .balance
                .saturating_add(tx.amount.saturating_add(tx.fee));
            sender.tx_cnt = sender.tx_cnt.saturating_sub(1);
        }
    }
}

/// Sort aggregate members into replay order: sender bytes, then counter.
pub fn sort_members(members: &mut [FundsTx]) {
    members.sort_by_key(|tx| (tx.from, tx.tx_cnt));
}

/// Replay the member transactions of each aggregate record and charge the
/// record's single fee.
///
/// Members move only their amount; their individual fees are superseded by
/// the aggregate fee, which is debited from the record's sender.
pub fn apply_agg_txs(state: &mut GlobalState, aggs: &[(AggTx, Vec<FundsTx>)]) -> Result<()> {
    for (idx, (agg, members)) in aggs.iter().enumerate() {
        if let Err(err) = apply_agg_tx(state, agg, members) {
            rollback_agg_txs(state, &aggs[..idx]);
            return Err(err);
        }
    }
    Ok(())
}

fn apply_agg_tx(state: &mut GlobalState, agg: &AggTx, members: &[FundsTx]) -> Result<()> {
    let computed: u64 = members.iter().map(|tx| tx.amount).sum();
    if computed != agg.amount {
        return Err(StateError::AggAmountMismatch {
            declared: agg.amount,
            computed,
        });
    }

    let mut ordered = members.to_vec();
    sort_members(&mut ordered);
    apply_member_txs(state, &ordered)?;

    // A record without a sender set is malformed.
    let fee_payer = match agg.from.first().copied() {
        Some(address) => address,
        None => {
            rollback_member_txs(state, &ordered);
            return Err(StateError::EmptyAggregate);
        }
    };

    let is_root = state.is_root(&fee_payer);
    let payer_balance = match state.get(&fee_payer) {
        Some(account) => account.balance,
        None => {
            rollback_member_txs(state, &ordered);
            return Err(StateError::UnknownAccount(fee_payer));
        }
    };
    if !is_root && payer_balance < agg.fee {
        rollback_member_txs(state, &ordered);
        return Err(StateError::InsufficientFunds {
            address: fee_payer,
            balance: payer_balance,
            required: agg.fee,
        });
    }

    let payer = state.get_mut(&fee_payer)?;
    payer.balance = payer.balance.saturating_sub(agg.fee);
    Ok(())
}

fn apply_member_txs(state: &mut GlobalState, txs: &[FundsTx]) -> Result<()> {
    for (idx, tx) in txs.iter().enumerate() {
        if let Err(err) = apply_member_tx(state, tx) {
            rollback_member_txs(state, &txs[..idx]);
            return Err(err);
        }
    }
    Ok(())
}

fn apply_member_tx(state: &mut GlobalState, tx: &FundsTx) -> Result<()> {
    let is_root = state.is_root(&tx.from);
    let sender = state.get_or_err(&tx.from)?;
    if !is_root && sender.balance < tx.amount {
        return Err(StateError::InsufficientFunds {
            address: tx.from,
            balance: sender.balance,
            required: tx.amount,
        });
    }
    if sender.tx_cnt != tx.tx_cnt {
        return Err(StateError::TxCntMismatch {
            address: tx.from,
            expected: sender.tx_cnt,
            actual: tx.tx_cnt,
        });
    }

    let receiver = state.get_or_err(&tx.to)?;
    if receiver.balance.saturating_add(tx.amount) > MAX_MONEY {
        return Err(StateError::BalanceOverflow {
            address: tx.to,
            balance: receiver.balance,
            amount: tx.amount,
        });
    }

    let sender = state.get_mut(&tx.from)?;
    sender.balance = sender.balance.saturating_sub(tx.amount);
    sender.tx_cnt += 1;
    let receiver = state.get_mut(&tx.to)?;
    receiver.balance += tx.amount;
    Ok(())
}

fn rollback_member_txs(state: &mut GlobalState, txs: &[FundsTx]) {
    for tx in txs.iter().rev() {
        if let Ok(receiver) = state.get_mut(&tx.to) {
            receiver.balance = receiver.balance.saturating_sub(tx.amount);
        }
        if let Ok(sender) = state.get_mut(&tx.from) {
            sender.balance = sender.balance.saturating_add(tx.amount);
            sender.tx_cnt = sender.tx_cnt.saturating_sub(1);
        }
    }
}

/// Inverse of [`apply_agg_txs`], applied in reverse record order.
pub fn rollback_agg_txs(state: &mut GlobalState, aggs: &[(AggTx, Vec<FundsTx>)]) {
    for (agg, members) in aggs.iter().rev() {
        if let Some(fee_payer) = agg.from.first() {
            if let Ok(payer) = state.get_mut(fee_payer) {
                payer.balance = payer.balance.saturating_add(agg.fee);
            }
        }
        let mut ordered = members.clone();
        sort_members(&mut ordered);
        rollback_member_txs(state, &ordered);
    }
}

/// Flip staking flags and register commitment keys.
pub fn apply_stake_txs(state: &mut GlobalState, txs: &[StakeTx], height: u32) -> Result<()> {
    for (idx, tx) in txs.iter().enumerate() {
        if let Err(err) = apply_stake_tx(state, tx, height) {
            rollback_stake_txs(state, &txs[..idx]);
            return Err(err);
        }
    }
    Ok(())
}

fn apply_stake_tx(state: &mut GlobalState, tx: &StakeTx, height: u32) -> Result<()> {
    let is_root = state.is_root(&tx.account);
    let account = state.get_mut(&tx.account)?;
    if account.is_staking == tx.is_staking {
        return Err(StateError::StakingFlagUnchanged(tx.account));
    }
    if !is_root && account.balance < tx.fee {
        return Err(StateError::InsufficientFunds {
            address: tx.account,
            balance: account.balance,
            required: tx.fee,
        });
    }
    account.balance = account.balance.saturating_sub(tx.fee);
    account.is_staking = tx.is_staking;
    account.commitment_key = tx.commitment_key;
    if tx.is_staking {
        account.staking_block_height = height;
    }
    Ok(())
}

/// Inverse of [`apply_stake_txs`]: the previous flag is the negation of the
/// requested one, since the transition requires them to differ.
pub fn rollback_stake_txs(state: &mut GlobalState, txs: &[StakeTx]) {
    for tx in txs.iter().rev() {
        if let Ok(account) = state.get_mut(&tx.account) {
            account.balance = account.balance.saturating_add(tx.fee);
            account.is_staking = !tx.is_staking;
        }
    }
}

/// Deduct fees and bump counters for iot transactions. No amounts move.
pub fn apply_iot_txs(state: &mut GlobalState, txs: &[IotTx]) -> Result<()> {
    for (idx, tx) in txs.iter().enumerate() {
        if let Err(err) = apply_iot_tx(state, tx) {
            rollback_iot_txs(state, &txs[..idx]);
            return Err(err);
        }
    }
    Ok(())
}

fn apply_iot_tx(state: &mut GlobalState, tx: &IotTx) -> Result<()> {
    let is_root = state.is_root(&tx.from);
    let sender = state.get_or_err(&tx.from)?;
    if !is_root && sender.balance < tx.fee {
        return Err(StateError::InsufficientFunds {
            address: tx.from,
            balance: sender.balance,
            required: tx.fee,
        });
    }
    if sender.tx_cnt != tx.tx_cnt {
        return Err(StateError::TxCntMismatch {
            address: tx.from,
            expected: sender.tx_cnt,
            actual: tx.tx_cnt,
        });
    }
    let sender = state.get_mut(&tx.from)?;
    sender.balance = sender.balance.saturating_sub(tx.fee);
    sender.tx_cnt += 1;
    Ok(())
}

/// Inverse of [`apply_iot_txs`].
pub fn rollback_iot_txs(state: &mut GlobalState, txs: &[IotTx]) {
    for tx in txs.iter().rev() {
        if let Ok(sender) = state.get_mut(&tx.from) {
            sender.balance = sender.balance.saturating_add(tx.fee);
            sender.tx_cnt = sender.tx_cnt.saturating_sub(1);
        }
    }
}

/// Credit the summed fees of a block to its beneficiary.
pub fn collect_fees(state: &mut GlobalState, fee_sum: u64, beneficiary: &[u8; 32]) -> Result<()> {
    let account = state.get_mut(beneficiary)?;
    if account.balance.saturating_add(fee_sum) > MAX_MONEY {
        return Err(StateError::BalanceOverflow {
            address: *beneficiary,
            balance: account.balance,
            amount: fee_sum,
        });
    }
    account.balance += fee_sum;
    Ok(())
}

/// Inverse of [`collect_fees`].
pub fn rollback_fees(state: &mut GlobalState, fee_sum: u64, beneficiary: &[u8; 32]) {
    if let Ok(account) = state.get_mut(beneficiary) {
        account.balance = account.balance.saturating_sub(fee_sum);
    }
}

/// Credit the block reward to the beneficiary.
pub fn collect_block_reward(
    state: &mut GlobalState,
    reward: u64,
    beneficiary: &[u8; 32],
) -> Result<()> {
    collect_fees(state, reward, beneficiary)
}

/// Inverse of [`collect_block_reward`].
pub fn rollback_block_reward(state: &mut GlobalState, reward: u64, beneficiary: &[u8; 32]) {
    rollback_fees(state, reward, beneficiary);
}

/// If the block carries a slashing proof, credit the slash reward and drop
/// the slashed account from the validator set.
pub fn collect_slash_reward(state: &mut GlobalState, reward: u64, block: &Block) -> Result<()> {
    if !block.has_slashing_proof() {
        return Ok(());
    }
    collect_fees(state, reward, &block.beneficiary)?;
    let slashed = state.get_mut(&block.slashed_address)?;
    slashed.is_staking = false;
    Ok(())
}

/// Inverse of [`collect_slash_reward`].
pub fn rollback_slash_reward(state: &mut GlobalState, reward: u64, block: &Block) {
    if !block.has_slashing_proof() {
        return;
    }
    if let Ok(slashed) = state.get_mut(&block.slashed_address) {
        slashed.is_staking = true;
    }
    rollback_fees(state, reward, &block.beneficiary);
}

/// Record that the beneficiary validated at this height. Returns the
/// previous height so the caller can restore it on rollback.
pub fn update_staking_height(state: &mut GlobalState, block: &Block) -> Result<u32> {
    let account = state.get_mut(&block.beneficiary)?;
    let previous = account.staking_block_height;
    account.staking_block_height = block.height;
    Ok(previous)
}

/// Inverse of [`update_staking_height`].
pub fn rollback_staking_height(state: &mut GlobalState, block: &Block, previous: u32) {
    if let Ok(account) = state.get_mut(&block.beneficiary) {
        account.staking_block_height = previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(seed: u8, balance: u64) -> Account {
        let mut account = Account::new([seed; 32]);
        account.balance = balance;
        account
    }

    fn funds_tx(from: &Account, to: &Account, amount: u64, tx_cnt: u32) -> FundsTx {
        FundsTx {
            header: 0,
            amount,
            fee: 1,
            tx_cnt,
            from: from.id(),
            to: to.id(),
            sig: [0u8; 64],
            aggregated: false,
            data: Vec::new(),
        }
    }

    #[test]
    fn test_funds_application_charges_amount_plus_fee() {
        let mut state = GlobalState::new();
        let a = account(1, 1000);
        let b = account(2, 0);
        let tx = funds_tx(&a, &b, 100, 0);
        let (a_id, b_id) = (a.id(), b.id());
        state.put(a);
        state.put(b);

        apply_funds_txs(&mut state, &[tx]).unwrap();
        assert_eq!(state.get(&a_id).unwrap().balance, 899);
        assert_eq!(state.get(&a_id).unwrap().tx_cnt, 1);
        assert_eq!(state.get(&b_id).unwrap().balance, 100);
    }

    #[test]
    fn test_funds_rollback_is_exact_inverse() {
        let mut state = GlobalState::new();
        let a = account(1, 1000);
        let b = account(2, 50);
        let txs = vec![funds_tx(&a, &b, 100, 0), funds_tx(&a, &b, 200, 1)];
        let (a_id, b_id) = (a.id(), b.id());
        state.put(a);
        state.put(b);

        apply_funds_txs(&mut state, &txs).unwrap();
        rollback_funds_txs(&mut state, &txs);
        assert_eq!(state.get(&a_id).unwrap().balance, 1000);
        assert_eq!(state.get(&a_id).unwrap().tx_cnt, 0);
        assert_eq!(state.get(&b_id).unwrap().balance, 50);
    }

    #[test]
    fn test_partial_failure_unwinds_applied_prefix() {
        let mut state = GlobalState::new();
        let a = account(1, 150);
        let b = account(2, 0);
        // Second tx exceeds the remaining balance.
        let txs = vec![funds_tx(&a, &b, 100, 0), funds_tx(&a, &b, 100, 1)];
        let (a_id, b_id) = (a.id(), b.id());
        state.put(a);
        state.put(b);

        let err = apply_funds_txs(&mut state, &txs).unwrap_err();
        assert!(matches!(err, StateError::InsufficientFunds { .. }));
        assert_eq!(state.get(&a_id).unwrap().balance, 150);
        assert_eq!(state.get(&a_id).unwrap().tx_cnt, 0);
        assert_eq!(state.get(&b_id).unwrap().balance, 0);
    }

    #[test]
    fn test_tx_cnt_mismatch_is_hard_failure() {
        let mut state = GlobalState::new();
        let a = account(1, 1000);
        let b = account(2, 0);
        let tx = funds_tx(&a, &b, 100, 5);
        state.put(a);
        state.put(b);

        assert!(matches!(
            apply_funds_txs(&mut state, &[tx]),
            Err(StateError::TxCntMismatch { expected: 0, actual: 5, .. })
        ));
    }

    #[test]
    fn test_receiver_overflow_rejected() {
        let mut state = GlobalState::new();
        let a = account(1, 1000);
        let b = account(2, MAX_MONEY - 50);
        let tx = funds_tx(&a, &b, 51, 0);
        state.put(a);
        state.put(b);

        assert!(matches!(
            apply_funds_txs(&mut state, &[tx]),
            Err(StateError::BalanceOverflow { .. })
        ));
    }

    #[test]
    fn test_agg_amount_mismatch_rejected() {
        let mut state = GlobalState::new();
        let a = account(1, 1000);
        let b = account(2, 0);
        let member = funds_tx(&a, &b, 100, 0);
        state.put(a);
        state.put(b);

        let agg = AggTx {
            amount: 150,
            fee: 1,
            from: vec![member.from],
            to: vec![member.to],
            aggregated_tx_slice: vec![member.hash()],
            aggregated: false,
        };
        assert!(matches!(
            apply_agg_txs(&mut state, &[(agg, vec![member])]),
            Err(StateError::AggAmountMismatch { declared: 150, computed: 100 })
        ));
    }

    #[test]
    fn test_agg_members_replay_in_counter_order() {
        let mut state = GlobalState::new();
        let a = account(1, 300);
        let b = account(2, 0);
        // Out-of-order members only replay when sorted by (sender, tx_cnt).
        let second = funds_tx(&a, &b, 100, 1);
        let first = funds_tx(&a, &b, 100, 0);
        let (a_id, b_id) = (a.id(), b.id());
        state.put(a);
        state.put(b);

        let agg = AggTx {
            amount: 200,
            fee: 1,
            from: vec![a_id],
            to: vec![b_id],
            aggregated_tx_slice: vec![second.hash(), first.hash()],
            aggregated: false,
        };
        apply_agg_txs(&mut state, &[(agg, vec![second, first])]).unwrap();
        assert_eq!(state.get(&a_id).unwrap().tx_cnt, 2);
        assert_eq!(state.get(&b_id).unwrap().balance, 200);
        // Amounts plus the single aggregate fee; no member fees.
        assert_eq!(state.get(&a_id).unwrap().balance, 99);
    }

    #[test]
    fn test_agg_charges_single_aggregate_fee() {
        let mut state = GlobalState::new();
        let a = account(1, 1000);
        let b = account(2, 0);
        let c = account(3, 0);
        // Member fees are deliberately large; they must never be charged.
        let mut to_b = funds_tx(&a, &b, 100, 0);
        to_b.fee = 5;
        let mut to_c = funds_tx(&a, &c, 200, 1);
        to_c.fee = 7;
        let (a_id, b_id, c_id) = (a.id(), b.id(), c.id());
        state.put(a);
        state.put(b);
        state.put(c);

        let agg = AggTx {
            amount: 300,
            fee: 1,
            from: vec![a_id],
            to: vec![b_id, c_id],
            aggregated_tx_slice: vec![to_b.hash(), to_c.hash()],
            aggregated: false,
        };
        let aggs = vec![(agg, vec![to_b, to_c])];

        apply_agg_txs(&mut state, &aggs).unwrap();
        assert_eq!(state.get(&a_id).unwrap().balance, 699);
        assert_eq!(state.get(&b_id).unwrap().balance, 100);
        assert_eq!(state.get(&c_id).unwrap().balance, 200);

        rollback_agg_txs(&mut state, &aggs);
        assert_eq!(state.get(&a_id).unwrap().balance, 1000);
        assert_eq!(state.get(&a_id).unwrap().tx_cnt, 0);
        assert_eq!(state.get(&b_id).unwrap().balance, 0);
        assert_eq!(state.get(&c_id).unwrap().balance, 0);
    }

    #[test]
    fn test_stake_flag_must_change() {
        let mut state = GlobalState::new();
        let a = account(1, 100);
        let a_id = a.id();
        state.put(a);

        let tx = StakeTx {
            header: 0,
            fee: 1,
            is_staking: true,
            account: a_id,
            commitment_key: [9u8; 256],
            sig: [0u8; 64],
        };
        apply_stake_txs(&mut state, &[tx.clone()], 12).unwrap();
        let staked = state.get(&a_id).unwrap();
        assert!(staked.is_staking);
        assert_eq!(staked.staking_block_height, 12);

        assert_eq!(
            apply_stake_txs(&mut state, &[tx], 13),
            Err(StateError::StakingFlagUnchanged(a_id))
        );
    }

    #[test]
    fn test_slash_reward_unstakes_offender() {
        let mut state = GlobalState::new();
        let beneficiary = account(1, 0);
        let mut offender = account(2, 0);
        offender.is_staking = true;
        let (b_id, o_id) = (beneficiary.id(), offender.id());
        state.put(beneficiary);
        state.put(offender);

        let mut block = Block::default();
        block.beneficiary = b_id;
        block.slashed_address = o_id;
        block.conflicting_block_hash1 = [1u8; 32];
        block.conflicting_block_hash2 = [2u8; 32];

        collect_slash_reward(&mut state, 2, &block).unwrap();
        assert_eq!(state.get(&b_id).unwrap().balance, 2);
        assert!(!state.get(&o_id).unwrap().is_staking);

        rollback_slash_reward(&mut state, 2, &block);
        assert_eq!(state.get(&b_id).unwrap().balance, 0);
        assert!(state.get(&o_id).unwrap().is_staking);
    }

    #[test]
    fn test_acc_creation_and_rollback() {
        let mut state = GlobalState::new();
        let tx = AccTx {
            header: 0,
            issuer: [0u8; 32],
            fee: 1,
            pub_key: [5u8; 32],
            sig: [0u8; 64],
            contract: None,
            contract_variables: None,
        };
        let created = address_of(&[5u8; 32]);

        apply_acc_txs(&mut state, &[tx.clone()]).unwrap();
        assert!(state.contains(&created));

        // A duplicate creation fails.
        assert_eq!(
            apply_acc_txs(&mut state, &[tx.clone()]),
            Err(StateError::AccountAlreadyExists(created))
        );

        rollback_acc_txs(&mut state, &[tx]);
        assert!(!state.contains(&created));
    }

    #[test]
    fn test_staking_height_round_trip() {
        let mut state = GlobalState::new();
        let mut validator = account(1, 0);
        validator.staking_block_height = 3;
        let v_id = validator.id();
        state.put(validator);

        let mut block = Block::default();
        block.beneficiary = v_id;
        block.height = 9;

        let previous = update_staking_height(&mut state, &block).unwrap();
        assert_eq!(previous, 3);
        assert_eq!(state.get(&v_id).unwrap().staking_block_height, 9);
        rollback_staking_height(&mut state, &block, previous);
        assert_eq!(state.get(&v_id).unwrap().staking_block_height, 3);
    }
}
