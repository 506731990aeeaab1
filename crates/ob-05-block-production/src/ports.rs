//! Driven ports of the block production subsystem.

use shared_types::{Account, Block, FundsTx};
use thiserror::Error;

/// Error returned by a rejected contract invocation.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("contract execution rejected: {0}")]
pub struct VmExecutionError(pub String);

/// The embedded smart-contract virtual machine, reduced to its single
/// entry point: run a funds transaction's data payload against the
/// receiving contract account. On success the account's contract storage
/// has been updated in place.
pub trait ContractVm: Send + Sync {
    /// Execute `tx.data` against the contract account.
    fn execute(&self, account: &mut Account, tx: &FundsTx) -> Result<(), VmExecutionError>;
}

/// Accepts every invocation without touching the account.
#[derive(Default)]
pub struct NoopVm;

impl ContractVm for NoopVm {
    fn execute(&self, _account: &mut Account, _tx: &FundsTx) -> Result<(), VmExecutionError> {
        Ok(())
    }
}

/// The difficulty-adjustment statistics collector, seen from the miner: it
/// consumes finalized blocks and yields the current difficulty in bits.
pub trait DifficultySource: Send + Sync {
    /// Difficulty the next block must satisfy, in leading zero bits.
    fn current_difficulty(&self) -> u8;

    /// Feed a freshly validated block into the collector.
    fn record_block(&self, block: &Block);
}

/// Constant difficulty, for tests and single-node setups.
pub struct FixedDifficulty(pub u8);

impl DifficultySource for FixedDifficulty {
    fn current_difficulty(&self) -> u8 {
        self.0
    }

    fn record_block(&self, _block: &Block) {}
}

/// Clock abstraction so sealing is deterministic in tests.
pub trait TimeSource: Send + Sync {
    /// Current unix time in seconds.
    fn now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Fixed time, for tests.
pub struct FixedTimeSource(pub i64);

impl TimeSource for FixedTimeSource {
    fn now(&self) -> i64 {
        self.0
    }
}
