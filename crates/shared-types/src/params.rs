//! # System Parameters
//!
//! The tunable parameter set, the per-id bounds enforced on config
//! transactions, and the registry that tracks which block activated which
//! parameter set so that rollbacks can restore the previous one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{Hash, EMPTY_HASH};
use crate::transaction::ConfigTx;

/// Parameter id: maximum block size in bytes.
pub const BLOCK_SIZE_ID: u8 = 1;
/// Parameter id: difficulty adjustment interval in blocks.
pub const DIFF_INTERVAL_ID: u8 = 2;
/// Parameter id: minimum transaction fee.
pub const FEE_MINIMUM_ID: u8 = 3;
/// Parameter id: target block interval in seconds.
pub const BLOCK_INTERVAL_ID: u8 = 4;
/// Parameter id: block reward.
pub const BLOCK_REWARD_ID: u8 = 5;
/// Parameter id: minimum balance required to stake.
pub const STAKING_MINIMUM_ID: u8 = 6;
/// Parameter id: blocks a fresh staker must wait before validating.
pub const WAITING_MINIMUM_ID: u8 = 7;
/// Parameter id: accepted future timestamp skew in seconds.
pub const ACCEPTED_TIME_DIFF_ID: u8 = 8;
/// Parameter id: slashing window size in blocks.
pub const SLASHING_WINDOW_SIZE_ID: u8 = 9;
/// Parameter id: reward for a valid slashing proof.
pub const SLASH_REWARD_ID: u8 = 10;

/// Errors raised by parameter updates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    /// The payload lies outside the declared range for the id.
    #[error("parameter {id} payload {payload} outside [{min}, {max}]")]
    OutOfRange {
        /// Parameter id.
        id: u8,
        /// Rejected payload.
        payload: u64,
        /// Lower inclusive bound.
        min: u64,
        /// Upper inclusive bound.
        max: u64,
    },

    /// No parameter is registered under the id.
    #[error("unknown parameter id {0}")]
    UnknownId(u8),
}

/// The active, consensus-relevant system parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    /// Maximum serialized block size in bytes.
    pub block_size: u64,
    /// Difficulty adjustment interval in blocks.
    pub diff_interval: u64,
    /// Minimum fee any transaction must carry.
    pub fee_minimum: u64,
    /// Target seconds between blocks.
    pub block_interval: u64,
    /// Reward credited to the beneficiary per block.
    pub block_reward: u64,
    /// Minimum balance an account needs to start staking.
    pub staking_minimum: u64,
    /// Blocks a staker must wait after joining before validating.
    pub waiting_minimum: u64,
    /// Accepted future skew of a block timestamp, in seconds.
    pub accepted_time_diff: u64,
    /// Height range within which double-signing is slashable.
    pub slashing_window_size: u64,
    /// Reward credited for including a valid slashing proof.
    pub slash_reward: u64,
    /// Number of ancestor commitment proofs mixed into the sortition hash.
    /// Not reachable via config transactions.
    pub num_included_prev_proofs: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            block_size: 5_000_000,
            diff_interval: 60,
            fee_minimum: 1,
            block_interval: 60,
            block_reward: 1,
            staking_minimum: 5,
            waiting_minimum: 0,
            accepted_time_diff: 10,
            slashing_window_size: 100,
            slash_reward: 2,
            num_included_prev_proofs: 5,
        }
    }
}

/// Inclusive payload bounds for a parameter id.
pub fn bounds(id: u8) -> Option<(u64, u64)> {
    match id {
        BLOCK_SIZE_ID => Some((1_000, 100_000_000)),
        DIFF_INTERVAL_ID => Some((30, 1_000)),
        FEE_MINIMUM_ID => Some((0, 10)),
        BLOCK_INTERVAL_ID => Some((15, 600)),
        BLOCK_REWARD_ID => Some((0, 100_000)),
        STAKING_MINIMUM_ID => Some((5, 10_000)),
        WAITING_MINIMUM_ID => Some((0, 100_000)),
        ACCEPTED_TIME_DIFF_ID => Some((0, 60)),
        SLASHING_WINDOW_SIZE_ID => Some((0, 10_000)),
        SLASH_REWARD_ID => Some((0, 1_000_000)),
        _ => None,
    }
}

/// Whether `payload` is acceptable for parameter `id`.
pub fn payload_in_bounds(id: u8, payload: u64) -> bool {
    matches!(bounds(id), Some((min, max)) if payload >= min && payload <= max)
}

impl Parameters {
    /// Apply a single parameter update, enforcing the id's bounds.
    pub fn apply(&mut self, id: u8, payload: u64) -> Result<(), ParameterError> {
        let (min, max) = bounds(id).ok_or(ParameterError::UnknownId(id))?;
        if payload < min || payload > max {
            return Err(ParameterError::OutOfRange {
                id,
                payload,
                min,
                max,
            });
        }

        match id {
            BLOCK_SIZE_ID => self.block_size = payload,
            DIFF_INTERVAL_ID => self.diff_interval = payload,
            FEE_MINIMUM_ID => self.fee_minimum = payload,
            BLOCK_INTERVAL_ID => self.block_interval = payload,
            BLOCK_REWARD_ID => self.block_reward = payload,
            STAKING_MINIMUM_ID => self.staking_minimum = payload,
            WAITING_MINIMUM_ID => self.waiting_minimum = payload,
            ACCEPTED_TIME_DIFF_ID => self.accepted_time_diff = payload,
            SLASHING_WINDOW_SIZE_ID => self.slashing_window_size = payload,
            SLASH_REWARD_ID => self.slash_reward = payload,
            _ => unreachable!("bounds() returned Some for unknown id"),
        }
        Ok(())
    }
}

/// One activated parameter set and the block that activated it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterChange {
    /// Hash of the block whose config transactions produced this set.
    pub block_hash: Hash,
    /// The full parameter set active from that block on.
    pub params: Parameters,
}

/// History of activated parameter sets.
///
/// Config transactions take effect after their block validates; rolling a
/// block back restores the previously active set.
#[derive(Clone, Debug)]
pub struct ParameterRegistry {
    history: Vec<ParameterChange>,
}

impl ParameterRegistry {
    /// Start the history with a genesis parameter set.
    pub fn new(genesis: Parameters) -> Self {
        Self {
            history: vec![ParameterChange {
                block_hash: EMPTY_HASH,
                params: genesis,
            }],
        }
    }

    /// The currently active parameters.
    pub fn active(&self) -> &Parameters {
        // The genesis entry is never popped, so the history is non-empty.
        &self.history[self.history.len() - 1]
            .params
    }

    /// Activate the config transactions of a validated block.
    ///
    /// Out-of-range payloads are skipped; the bounds were already checked
    /// during verification, so a skip here only happens for ids that lost
    /// their meaning. Returns true when a new parameter set was activated.
    pub fn apply_block(&mut self, block_hash: Hash, config_txs: &[ConfigTx]) -> bool {
        if config_txs.is_empty() {
            return false;
        }

        let mut params = *self.active();
        let mut changed = false;
        for tx in config_txs {
            match params.apply(tx.id, tx.payload) {
                Ok(()) => {
                    tracing::info!(id = tx.id, payload = tx.payload, "parameter updated");
                    changed = true;
                }
                Err(err) => {
                    tracing::warn!(id = tx.id, payload = tx.payload, %err, "config tx skipped");
                }
            }
        }

        if changed {
            self.history.push(ParameterChange { block_hash, params });
        }
        changed
    }

    /// Drop the parameter set contributed by a rolled-back block, if any.
    pub fn rollback_block(&mut self, block_hash: &Hash) {
        if self.history.len() > 1
            && self.history[self.history.len() - 1].block_hash == *block_hash
        {
            self.history.pop();
        }
    }
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::new(Parameters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_tx(id: u8, payload: u64) -> ConfigTx {
        ConfigTx {
            header: 0,
            id,
            payload,
            fee: 1,
            tx_cnt: 0,
            sig: [0u8; 64],
        }
    }

    #[test]
    fn test_bounds_enforced() {
        let mut params = Parameters::default();
        assert!(params.apply(FEE_MINIMUM_ID, 11).is_err());
        assert!(params.apply(FEE_MINIMUM_ID, 10).is_ok());
        assert_eq!(params.fee_minimum, 10);
    }

    #[test]
    fn test_unknown_id_rejected() {
        let mut params = Parameters::default();
        assert_eq!(params.apply(99, 5), Err(ParameterError::UnknownId(99)));
    }

    #[test]
    fn test_registry_applies_and_rolls_back() {
        let mut registry = ParameterRegistry::default();
        let fee_before = registry.active().fee_minimum;

        let changed = registry.apply_block([1u8; 32], &[config_tx(FEE_MINIMUM_ID, 3)]);
        assert!(changed);
        assert_eq!(registry.active().fee_minimum, 3);

        registry.rollback_block(&[1u8; 32]);
        assert_eq!(registry.active().fee_minimum, fee_before);
    }

    #[test]
    fn test_rollback_of_unrelated_block_is_noop() {
        let mut registry = ParameterRegistry::default();
        registry.apply_block([1u8; 32], &[config_tx(BLOCK_REWARD_ID, 50)]);
        registry.rollback_block(&[2u8; 32]);
        assert_eq!(registry.active().block_reward, 50);
    }

    #[test]
    fn test_out_of_range_tx_does_not_activate_set() {
        let mut registry = ParameterRegistry::default();
        let changed = registry.apply_block([1u8; 32], &[config_tx(FEE_MINIMUM_ID, 10_000)]);
        assert!(!changed);
        assert_eq!(registry.active().fee_minimum, 1);
    }
}
