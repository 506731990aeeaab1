//! The block validation service.

use ob_01_storage::{BlockStore, PreAggregationPool, TxStore};
use ob_02_state::{transitions, GlobalState};
use ob_03_tx_fetch::{BlockPayloads, PeerChannels, PeerNetwork, TxFetcher};
use ob_05_block_production::{validate_proof_of_stake, DifficultySource};
use parking_lot::{Mutex, RwLock};
use shared_crypto::CommitmentVerifier;
use shared_types::{
    merkle_root, Block, Hash, ParameterRegistry, SlashingDict, SlashingProof, Transaction,
    DELAYED_BLOCKS, NO_AGGREGATION_LENGTH,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::branch::block_sequences;
use crate::error::{Result, ValidationError};
use crate::rollback::{collect_closed_payloads, reverse_block_effects};
use crate::slashing::{slashing_check, SlashingDetector};

/// Maximum divergence between a block timestamp and system time, seconds.
const TIMESTAMP_BOUND_SECS: i64 = 3600;

/// Validates blocks against the global state and drives reorganizations.
pub struct Validator<S, B, P> {
    tx_store: Arc<S>,
    block_store: Arc<B>,
    peer: Arc<P>,
    channels: Arc<PeerChannels>,
    fetcher: TxFetcher<S, P>,
    state: Arc<RwLock<GlobalState>>,
    params: Arc<RwLock<ParameterRegistry>>,
    slashing_dict: Arc<Mutex<SlashingDict>>,
    pool: Arc<Mutex<PreAggregationPool>>,
    difficulty: Arc<dyn DifficultySource>,
    /// Serializes own-mined and received block validation.
    validation_lock: tokio::sync::Mutex<()>,
    head: RwLock<Option<Block>>,
    detector: Mutex<SlashingDetector>,
    /// Staking heights replaced per validated block, for exact rollback.
    staking_undo: Mutex<HashMap<Hash, u32>>,
}

impl<S, B, P> Validator<S, B, P>
where
    S: TxStore + 'static,
    B: BlockStore + 'static,
    P: PeerNetwork + 'static,
{
    /// Wire up a validator over the shared stores and ports.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tx_store: Arc<S>,
        block_store: Arc<B>,
        peer: Arc<P>,
        channels: Arc<PeerChannels>,
        state: Arc<RwLock<GlobalState>>,
        params: Arc<RwLock<ParameterRegistry>>,
        slashing_dict: Arc<Mutex<SlashingDict>>,
        pool: Arc<Mutex<PreAggregationPool>>,
        difficulty: Arc<dyn DifficultySource>,
    ) -> Self {
        let fetcher = TxFetcher::new(
            Arc::clone(&tx_store),
            Arc::clone(&peer),
            Arc::clone(&channels),
            Arc::clone(&state),
        );
        Self {
            tx_store,
            block_store,
            peer,
            channels,
            fetcher,
            state,
            params,
            slashing_dict,
            pool,
            difficulty,
            validation_lock: tokio::sync::Mutex::new(()),
            head: RwLock::new(None),
            detector: Mutex::new(SlashingDetector::new()),
            staking_undo: Mutex::new(HashMap::new()),
        }
    }

    /// Install the genesis block as the initial head. Carries no state
    /// effects of its own.
    pub fn install_genesis(&self, genesis: Block) {
        self.block_store.write_closed_block(genesis.clone());
        *self.head.write() = Some(genesis);
    }

    /// The current chain head.
    pub fn head(&self) -> Option<Block> {
        self.head.read().clone()
    }

    /// Validate a block, rolling back and replaying branches as needed.
    ///
    /// `initial_setup` marks bootstrap replay, where re-encountering closed
    /// transactions is legitimate and timestamp bounds are meaningless.
    #[tracing::instrument(skip(self, block), fields(height = block.height))]
    pub async fn validate(&self, block: Block, initial_setup: bool) -> Result<()> {
        let _guard = self.validation_lock.lock().await;

        let head = self.head().ok_or(ValidationError::HeadMissing)?;
        let (blocks_to_rollback, blocks_to_validate) = block_sequences(
            self.block_store.as_ref(),
            self.peer.as_ref(),
            &self.channels,
            &head,
            &block,
        )
        .await?;

        let uptodate = blocks_to_validate.len() <= DELAYED_BLOCKS;

        if !blocks_to_rollback.is_empty() {
            tracing::info!(count = blocks_to_rollback.len(), "rolling back branch");
        }
        for stale in &blocks_to_rollback {
            self.rollback_closed_block(stale)?;
            tracing::info!(height = stale.height, "rolled back block");
        }

        for candidate in blocks_to_validate {
            if let Err(err) = self.validate_one(&candidate, initial_setup, uptodate).await {
                tracing::warn!(height = candidate.height, %err, "block rejected");
                return Err(err);
            }
            tracing::info!(height = candidate.height, "block validated");
        }
        Ok(())
    }

    async fn validate_one(
        &self,
        block: &Block,
        initial_setup: bool,
        uptodate: bool,
    ) -> Result<()> {
        let payloads = self.pre_validate(block, initial_setup, uptodate).await?;

        // With the block located in the branch graph, look for double-signs
        // by its beneficiary.
        if block.height > 0 {
            let window = self.params.read().active().slashing_window_size;
            self.detector.lock().seek_slashing_proof(
                block,
                self.block_store.as_ref(),
                window,
                &mut self.slashing_dict.lock(),
            );
        }

        self.validate_state(block, &payloads)?;
        self.post_validate(block, payloads, initial_setup).await;
        Ok(())
    }

    /// Static and cryptographic checks; no state changes.
    async fn pre_validate(
        &self,
        block: &Block,
        initial_setup: bool,
        uptodate: bool,
    ) -> Result<BlockPayloads> {
        let params = *self.params.read().active();

        if !initial_setup && uptodate {
            let system_time = self.peer.system_time();
            if (block.timestamp - system_time).abs() > TIMESTAMP_BOUND_SECS {
                return Err(ValidationError::TimestampOutOfBounds {
                    timestamp: block.timestamp,
                    system_time,
                });
            }
        }

        if block.size() > params.block_size {
            return Err(ValidationError::BlockTooLarge {
                size: block.size(),
                limit: params.block_size,
            });
        }

        let mut seen = HashSet::with_capacity(block.total_tx_count());
        for hash in block
            .acc_tx_data
            .iter()
            .chain(&block.funds_tx_data)
            .chain(&block.config_tx_data)
            .chain(&block.stake_tx_data)
            .chain(&block.agg_tx_data)
            .chain(&block.iot_tx_data)
        {
            if !seen.insert(*hash) {
                return Err(ValidationError::DuplicateTx(*hash));
            }
        }

        let payloads = self.fetcher.fetch_block_payloads(block, initial_setup).await?;

        let beneficiary = self
            .state
            .read()
            .get(&block.beneficiary)
            .cloned()
            .ok_or(ValidationError::BeneficiaryNotStaking)?;
        if !beneficiary.is_staking {
            return Err(ValidationError::BeneficiaryNotStaking);
        }

        let verifier = CommitmentVerifier::from_modulus_bytes(&beneficiary.commitment_key)
            .map_err(|_| ValidationError::CommitmentProofInvalid)?;
        verifier
            .verify_height(block.height, &block.commitment_proof)
            .map_err(|_| ValidationError::CommitmentProofInvalid)?;

        let prev_proofs = self
            .block_store
            .latest_proofs(params.num_included_prev_proofs, block);
        if !validate_proof_of_stake(
            self.difficulty.current_difficulty(),
            &prev_proofs,
            block.height,
            beneficiary.balance,
            &block.commitment_proof,
            block.nonce,
        ) {
            return Err(ValidationError::PosInvalid);
        }

        let system_time = self.peer.system_time();
        if block.timestamp > system_time + params.accepted_time_diff as i64 {
            return Err(ValidationError::TimestampOutOfBounds {
                timestamp: block.timestamp,
                system_time,
            });
        }

        let since_staking = u64::from(block.height.saturating_sub(beneficiary.staking_block_height));
        if since_staking < params.waiting_minimum {
            return Err(ValidationError::WaitingMinimumUnmet {
                height: block.height,
                staking_height: beneficiary.staking_block_height,
                minimum: params.waiting_minimum,
            });
        }

        if block.has_slashing_proof() {
            let proof = SlashingProof {
                conflicting_block_hash1: block.conflicting_block_hash1,
                conflicting_block_hash2: block.conflicting_block_hash2,
                conflicting_block_hash_without_tx1: block.conflicting_block_hash_without_tx1,
                conflicting_block_hash_without_tx2: block.conflicting_block_hash_without_tx2,
            };
            slashing_check(
                self.block_store.as_ref(),
                self.peer.as_ref(),
                &self.channels,
                block.slashed_address,
                proof,
                params.slashing_window_size,
                &self.slashing_dict,
            )
            .await?;
        }

        if !block.aggregated && merkle_root(block) != block.merkle_root {
            return Err(ValidationError::MerkleMismatch);
        }

        Ok(payloads)
    }

    /// Apply the block's effects in category order; any failing step
    /// unwinds everything applied before it, in exact inverse order.
    fn validate_state(&self, block: &Block, payloads: &BlockPayloads) -> Result<()> {
        let params = *self.params.read().active();
        let mut state = self.state.write();

        transitions::apply_acc_txs(&mut state, &payloads.accs)?;

        if let Err(err) = transitions::apply_funds_txs(&mut state, &payloads.funds) {
            transitions::rollback_acc_txs(&mut state, &payloads.accs);
            return Err(err.into());
        }

        if let Err(err) = transitions::apply_agg_txs(&mut state, &payloads.aggs) {
            transitions::rollback_funds_txs(&mut state, &payloads.funds);
            transitions::rollback_acc_txs(&mut state, &payloads.accs);
            return Err(err.into());
        }

        if let Err(err) = transitions::apply_stake_txs(&mut state, &payloads.stakes, block.height)
        {
            transitions::rollback_agg_txs(&mut state, &payloads.aggs);
            transitions::rollback_funds_txs(&mut state, &payloads.funds);
            transitions::rollback_acc_txs(&mut state, &payloads.accs);
            return Err(err.into());
        }

        if let Err(err) = transitions::apply_iot_txs(&mut state, &payloads.iots) {
            transitions::rollback_stake_txs(&mut state, &payloads.stakes);
            transitions::rollback_agg_txs(&mut state, &payloads.aggs);
            transitions::rollback_funds_txs(&mut state, &payloads.funds);
            transitions::rollback_acc_txs(&mut state, &payloads.accs);
            return Err(err.into());
        }

        let fee_sum = payloads.fee_sum();
        if let Err(err) = transitions::collect_fees(&mut state, fee_sum, &block.beneficiary) {
            transitions::rollback_iot_txs(&mut state, &payloads.iots);
            transitions::rollback_stake_txs(&mut state, &payloads.stakes);
            transitions::rollback_agg_txs(&mut state, &payloads.aggs);
            transitions::rollback_funds_txs(&mut state, &payloads.funds);
            transitions::rollback_acc_txs(&mut state, &payloads.accs);
            return Err(err.into());
        }

        if let Err(err) =
            transitions::collect_block_reward(&mut state, params.block_reward, &block.beneficiary)
        {
            transitions::rollback_fees(&mut state, fee_sum, &block.beneficiary);
            transitions::rollback_iot_txs(&mut state, &payloads.iots);
            transitions::rollback_stake_txs(&mut state, &payloads.stakes);
            transitions::rollback_agg_txs(&mut state, &payloads.aggs);
            transitions::rollback_funds_txs(&mut state, &payloads.funds);
            transitions::rollback_acc_txs(&mut state, &payloads.accs);
            return Err(err.into());
        }

        if let Err(err) =
            transitions::collect_slash_reward(&mut state, params.slash_reward, block)
        {
            transitions::rollback_block_reward(&mut state, params.block_reward, &block.beneficiary);
            transitions::rollback_fees(&mut state, fee_sum, &block.beneficiary);
            transitions::rollback_iot_txs(&mut state, &payloads.iots);
            transitions::rollback_stake_txs(&mut state, &payloads.stakes);
            transitions::rollback_agg_txs(&mut state, &payloads.aggs);
            transitions::rollback_funds_txs(&mut state, &payloads.funds);
            transitions::rollback_acc_txs(&mut state, &payloads.accs);
            return Err(err.into());
        }

        match transitions::update_staking_height(&mut state, block) {
            Ok(previous) => {
                self.staking_undo.lock().insert(block.hash, previous);
                Ok(())
            }
            Err(err) => {
                transitions::rollback_slash_reward(&mut state, params.slash_reward, block);
                transitions::rollback_block_reward(
                    &mut state,
                    params.block_reward,
                    &block.beneficiary,
                );
                transitions::rollback_fees(&mut state, fee_sum, &block.beneficiary);
                transitions::rollback_iot_txs(&mut state, &payloads.iots);
                transitions::rollback_stake_txs(&mut state, &payloads.stakes);
                transitions::rollback_agg_txs(&mut state, &payloads.aggs);
                transitions::rollback_funds_txs(&mut state, &payloads.funds);
                transitions::rollback_acc_txs(&mut state, &payloads.accs);
                Err(err.into())
            }
        }
    }

    /// Storage moves, parameter activation, rebroadcast, compaction.
    async fn post_validate(&self, block: &Block, payloads: BlockPayloads, initial_setup: bool) {
        // New parameters become active only after the block validated.
        self.params.write().apply_block(block.hash, &payloads.configs);

        // Feed the difficulty statistics collector.
        self.difficulty.record_block(block);

        if !initial_setup {
            for tx in &payloads.accs {
                self.close_tx(Transaction::Acc(tx.clone()));
            }
            for tx in &payloads.funds {
                let hash = tx.hash();
                self.close_tx(Transaction::Funds(tx.clone()));
                self.tx_store.delete_invalid_open_tx(&hash);
                self.pool.lock().remove_counted(&hash);
            }
            for tx in &payloads.configs {
                self.close_tx(Transaction::Config(tx.clone()));
            }
            for tx in &payloads.stakes {
                self.close_tx(Transaction::Stake(tx.clone()));
            }
            for (agg, members) in &payloads.aggs {
                for member in members {
                    let hash = member.hash();
                    self.close_tx(Transaction::Funds(member.clone()));
                    self.tx_store.delete_invalid_open_tx(&hash);
                    self.pool.lock().remove_counted(&hash);
                }
                self.close_tx(Transaction::Agg(agg.clone()));
            }
            for tx in &payloads.iots {
                self.close_tx(Transaction::Iot(tx.clone()));
            }

            let mut verified = payloads.funds.clone();
            for (_, members) in &payloads.aggs {
                verified.extend(members.iter().cloned());
            }
            if !verified.is_empty() {
                self.peer.broadcast_verified_txs(verified).await;
            }

            self.block_store.delete_open_block(&block.hash);
            self.block_store.write_closed_block(block.clone());

            // Compact ancestors deep enough below the new head.
            let horizon = block.height.saturating_sub(NO_AGGREGATION_LENGTH);
            for ancestor in self.block_store.read_all_closed_blocks() {
                if ancestor.height > 0 && ancestor.height < horizon {
                    if let Err(err) =
                        self.block_store.update_block_to_block_without_tx(&ancestor.hash)
                    {
                        tracing::warn!(height = ancestor.height, %err, "compaction failed");
                    }
                }
            }
        } else {
            self.block_store.write_closed_block(block.clone());
        }

        *self.head.write() = Some(block.clone());
    }

    fn close_tx(&self, tx: Transaction) {
        let hash = tx.hash();
        self.tx_store.write_closed_tx(tx);
        self.tx_store.delete_open_tx(&hash);
    }

    /// Undo a validated block: payloads come back out of closed storage,
    /// state effects reverse, transactions reopen, the head moves to the
    /// parent.
    fn rollback_closed_block(&self, block: &Block) -> Result<()> {
        let payloads = collect_closed_payloads(self.tx_store.as_ref(), block)?;

        // Parameters revert before state, mirroring their late activation.
        self.params.write().rollback_block(&block.hash);
        let params = *self.params.read().active();

        // Blocks validated by an earlier process have no recorded staking
        // height; zero keeps the beneficiary eligible.
        let previous_staking_height = self
            .staking_undo
            .lock()
            .remove(&block.hash)
            .unwrap_or_default();

        {
            let mut state = self.state.write();
            reverse_block_effects(&mut state, &params, block, &payloads, previous_staking_height);
        }

        for tx in &payloads.accs {
            self.reopen_tx(Transaction::Acc(tx.clone()));
        }
        for tx in &payloads.funds {
            self.reopen_tx(Transaction::Funds(tx.clone()));
        }
        for tx in &payloads.configs {
            self.reopen_tx(Transaction::Config(tx.clone()));
        }
        for tx in &payloads.stakes {
            self.reopen_tx(Transaction::Stake(tx.clone()));
        }
        for (agg, members) in &payloads.aggs {
            for member in members {
                self.reopen_tx(Transaction::Funds(member.clone()));
            }
            self.reopen_tx(Transaction::Agg(agg.clone()));
        }
        for tx in &payloads.iots {
            self.reopen_tx(Transaction::Iot(tx.clone()));
        }

        self.block_store.delete_closed_block(&block.hash);
        self.block_store.write_open_block(block.clone());

        let parent = self
            .block_store
            .read_closed_block(&block.prev_hash)
            .ok_or(ValidationError::ClosedChainBroken(block.prev_hash))?;
        *self.head.write() = Some(parent);
        Ok(())
    }

    fn reopen_tx(&self, tx: Transaction) {
        let hash = tx.hash();
        self.tx_store.write_open_tx(tx);
        self.tx_store.delete_closed_tx(&hash);
    }
}
