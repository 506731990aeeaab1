//! Candidate block assembly.
//!
//! Transaction inclusion operates on a copy of the touched accounts, never
//! on the global state: validation of a competing block may interleave and
//! must see a consistent global view. A rejected transaction leaves the
//! candidate untouched; a rejected candidate is simply dropped.

use ob_01_storage::{BlockStore, PreAggregationPool, TxStore};
use ob_02_state::{verify, GlobalState, StateCopy, StateError};
use ob_04_aggregation::aggregate_pending;
use parking_lot::{Mutex, RwLock};
use shared_crypto::CommitmentKeyPair;
use shared_types::{
    address_of, merkle_root, AccTx, Address, Block, CommitmentProof, FundsTx, Hash, IotTx,
    ParameterRegistry, StakeTx, SlashingDict, Transaction, MAX_MONEY,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ProductionError, Result};
use crate::ports::{ContractVm, DifficultySource, TimeSource};
use crate::sortition::proof_of_stake;

/// A block under assembly together with its private state overlay.
pub struct Candidate {
    /// The block being filled.
    pub block: Block,
    overlay: StateCopy,
}

/// Builds and seals candidate blocks for one validator.
pub struct BlockAssembler<S, B> {
    tx_store: Arc<S>,
    block_store: Arc<B>,
    vm: Arc<dyn ContractVm>,
    difficulty: Arc<dyn DifficultySource>,
    time: Box<dyn TimeSource>,
    state: Arc<RwLock<GlobalState>>,
    params: Arc<RwLock<ParameterRegistry>>,
    slashing_dict: Arc<Mutex<SlashingDict>>,
    pool: Arc<Mutex<PreAggregationPool>>,
    validator_address: Address,
    commitment_key: CommitmentKeyPair,
    cancel: Arc<AtomicBool>,
}

impl<S, B> BlockAssembler<S, B>
where
    S: TxStore,
    B: BlockStore,
{
    /// Create an assembler for the validator identified by
    /// `validator_address` (its account hash).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tx_store: Arc<S>,
        block_store: Arc<B>,
        vm: Arc<dyn ContractVm>,
        difficulty: Arc<dyn DifficultySource>,
        time: Box<dyn TimeSource>,
        state: Arc<RwLock<GlobalState>>,
        params: Arc<RwLock<ParameterRegistry>>,
        slashing_dict: Arc<Mutex<SlashingDict>>,
        pool: Arc<Mutex<PreAggregationPool>>,
        validator_address: Address,
        commitment_key: CommitmentKeyPair,
    ) -> Self {
        Self {
            tx_store,
            block_store,
            vm,
            difficulty,
            time,
            state,
            params,
            slashing_dict,
            pool,
            validator_address,
            commitment_key,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start an empty candidate on top of the given parent.
    pub fn new_block(
        &self,
        prev_hash: Hash,
        prev_hash_without_tx: Hash,
        commitment_proof: CommitmentProof,
        height: u32,
    ) -> Candidate {
        Candidate {
            block: Block::new(prev_hash, prev_hash_without_tx, commitment_proof, height),
            overlay: StateCopy::new(),
        }
    }

    /// Ask a running sortition to give up. The next [`Self::finalize`] call
    /// must be preceded by [`Self::reset_cancellation`].
    pub fn cancel_sortition(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Re-arm sortition after a cancellation.
    pub fn reset_cancellation(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    /// Add a verified transaction to the candidate.
    ///
    /// Runs the static fee check, signature verification, and the
    /// category-specific inclusion rule. Errors leave both the candidate
    /// and the before-aggregation pool untouched.
    pub fn add_tx(&self, candidate: &mut Candidate, tx: Transaction) -> Result<()> {
        let fee_minimum = self.params.read().active().fee_minimum;
        if tx.fee() < fee_minimum {
            tracing::debug!(fee = tx.fee(), fee_minimum, "transaction fee too low");
            return Err(ProductionError::FeeTooLow {
                fee: tx.fee(),
                minimum: fee_minimum,
            });
        }

        verify(&tx, &self.state.read())?;

        let result = match tx {
            Transaction::Acc(tx) => self.add_acc_tx(candidate, tx),
            Transaction::Funds(tx) => self.add_funds_tx(candidate, tx),
            Transaction::Config(tx) => {
                // Parameter application is deferred to post-validation.
                candidate.block.config_tx_data.push(tx.hash());
                Ok(())
            }
            Transaction::Stake(tx) => self.add_stake_tx(candidate, tx),
            Transaction::Iot(tx) => self.add_iot_tx(candidate, tx),
            Transaction::Agg(_) => Err(ProductionError::UnsupportedCategory),
        };

        if let Err(err) = &result {
            tracing::debug!(%err, "transaction not included");
        }
        result
    }

    fn add_acc_tx(&self, candidate: &mut Candidate, tx: AccTx) -> Result<()> {
        let address = address_of(&tx.pub_key);
        if !tx.is_removal() && self.state.read().contains(&address) {
            return Err(StateError::AccountAlreadyExists(address).into());
        }
        candidate.block.acc_tx_data.push(tx.hash());
        Ok(())
    }

    fn add_funds_tx(&self, candidate: &mut Candidate, tx: FundsTx) -> Result<()> {
        let is_root = {
            let state = self.state.read();
            candidate.overlay.touch(&state, &tx.from)?;
            candidate.overlay.touch(&state, &tx.to)?;
            state.is_root(&tx.from)
        };

        let sender = candidate
            .overlay
            .get(&tx.from)
            .ok_or(StateError::UnknownAccount(tx.from))?;
        let required = tx.amount.saturating_add(tx.fee);
        if !is_root && sender.balance < required {
            return Err(StateError::InsufficientFunds {
                address: tx.from,
                balance: sender.balance,
                required,
            }
            .into());
        }
        if sender.tx_cnt != tx.tx_cnt {
            return Err(StateError::TxCntMismatch {
                address: tx.from,
                expected: sender.tx_cnt,
                actual: tx.tx_cnt,
            }
            .into());
        }

        let receiver = candidate
            .overlay
            .get(&tx.to)
            .ok_or(StateError::UnknownAccount(tx.to))?;
        if receiver.balance.saturating_add(tx.amount) > MAX_MONEY {
            return Err(StateError::BalanceOverflow {
                address: tx.to,
                balance: receiver.balance,
                amount: tx.amount,
            }
            .into());
        }

        // Contract invocation runs before any balance moves, so a rejected
        // call cannot leave a half-applied transfer.
        if receiver.is_contract() && !tx.data.is_empty() {
            let receiver = candidate
                .overlay
                .get_mut(&tx.to)
                .ok_or(StateError::UnknownAccount(tx.to))?;
            self.vm.execute(receiver, &tx)?;
        }

        // Reserves amount plus fee; if the transfer later folds into an
        // aggregate record, validation charges the amount only and the
        // record's single fee instead.
        if let Some(sender) = candidate.overlay.get_mut(&tx.from) {
            sender.balance = sender.balance.saturating_sub(required);
            sender.tx_cnt += 1;
        }
        if let Some(receiver) = candidate.overlay.get_mut(&tx.to) {
            receiver.balance += tx.amount;
        }

        // The hash enters the block through the aggregation pass at sealing
        // time; until then the payload waits in the pool.
        self.pool.lock().insert(tx);
        Ok(())
    }

    fn add_stake_tx(&self, candidate: &mut Candidate, tx: StakeTx) -> Result<()> {
        let (is_root, staking_minimum) = {
            let state = self.state.read();
            candidate.overlay.touch(&state, &tx.account)?;
            (
                state.is_root(&tx.account),
                self.params.read().active().staking_minimum,
            )
        };

        let account = candidate
            .overlay
            .get(&tx.account)
            .ok_or(StateError::UnknownAccount(tx.account))?;
        let required = tx.fee.saturating_add(staking_minimum);
        if !is_root && account.balance < required {
            return Err(StateError::StakeBelowMinimum {
                address: tx.account,
                balance: account.balance,
                required,
            }
            .into());
        }
        if account.is_staking == tx.is_staking {
            return Err(StateError::StakingFlagUnchanged(tx.account).into());
        }

        let height = candidate.block.height;
        if let Some(account) = candidate.overlay.get_mut(&tx.account) {
            account.balance = account.balance.saturating_sub(tx.fee);
            account.is_staking = tx.is_staking;
            account.commitment_key = tx.commitment_key;
            if tx.is_staking {
                account.staking_block_height = height;
            }
        }
        candidate.block.stake_tx_data.push(tx.hash());
        Ok(())
    }

    fn add_iot_tx(&self, candidate: &mut Candidate, tx: IotTx) -> Result<()> {
        let is_root = {
            let state = self.state.read();
            candidate.overlay.touch(&state, &tx.from)?;
            candidate.overlay.touch(&state, &tx.to)?;
            state.is_root(&tx.from)
        };

        let sender = candidate
            .overlay
            .get(&tx.from)
            .ok_or(StateError::UnknownAccount(tx.from))?;
        if !is_root && sender.balance < tx.fee {
            return Err(StateError::InsufficientFunds {
                address: tx.from,
                balance: sender.balance,
                required: tx.fee,
            }
            .into());
        }
        if sender.tx_cnt != tx.tx_cnt {
            return Err(StateError::TxCntMismatch {
                address: tx.from,
                expected: sender.tx_cnt,
                actual: tx.tx_cnt,
            }
            .into());
        }

        if let Some(sender) = candidate.overlay.get_mut(&tx.from) {
            sender.balance = sender.balance.saturating_sub(tx.fee);
            sender.tx_cnt += 1;
        }
        candidate.block.iot_tx_data.push(tx.hash());
        Ok(())
    }

    /// Seal the candidate: slashing proof, aggregation, merkle root,
    /// beneficiary, commitment proof, sortition, final hashes, counts.
    ///
    /// The overlay is dropped here; the sealed block earns its state
    /// effects by passing validation like any other block.
    #[tracing::instrument(skip(self, candidate), fields(height = candidate.block.height))]
    pub fn finalize(&self, candidate: Candidate) -> Result<Block> {
        let mut block = candidate.block;

        // Attach at most one pending slashing proof.
        {
            let mut dict = self.slashing_dict.lock();
            if let Some(slashed) = dict.keys().next().copied() {
                if let Some(proof) = dict.remove(&slashed) {
                    block.slashed_address = slashed;
                    block.conflicting_block_hash1 = proof.conflicting_block_hash1;
                    block.conflicting_block_hash2 = proof.conflicting_block_hash2;
                    block.conflicting_block_hash_without_tx1 =
                        proof.conflicting_block_hash_without_tx1;
                    block.conflicting_block_hash_without_tx2 =
                        proof.conflicting_block_hash_without_tx2;
                }
            }
        }

        let fee_minimum = self.params.read().active().fee_minimum;
        aggregate_pending(
            &mut self.pool.lock(),
            &mut block,
            self.tx_store.as_ref(),
            fee_minimum,
        )?;

        block.merkle_root = merkle_root(&block);
        block.beneficiary = self.validator_address;

        let balance = self
            .state
            .read()
            .get(&self.validator_address)
            .ok_or(ProductionError::MissingValidatorAccount)?
            .balance;

        block.commitment_proof = self.commitment_key.sign_height(block.height)?;

        let num_proofs = self.params.read().active().num_included_prev_proofs;
        let prev_proofs = self.block_store.latest_proofs(num_proofs, &block);

        let start_nonce = self.time.now().max(0) as u64;
        let nonce = match proof_of_stake(
            self.difficulty.current_difficulty(),
            &prev_proofs,
            block.height,
            balance,
            &block.commitment_proof,
            start_nonce,
            &self.cancel,
        ) {
            Ok(nonce) => nonce,
            Err(err) => {
                // Aggregate records created for this candidate are
                // speculative; remove them before surfacing the error.
                for hash in &block.agg_tx_data {
                    self.tx_store.delete_open_tx(hash);
                }
                return Err(err.into());
            }
        };

        block.seal(nonce);
        block.update_tx_counts();
        tracing::info!(
            height = block.height,
            nonce,
            txs = block.total_tx_count(),
            "candidate block sealed"
        );
        Ok(block)
    }
}
