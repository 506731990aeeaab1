//! # Core Domain Entities
//!
//! Accounts and blocks, plus the primitive byte aliases used everywhere.
//!
//! ## Clusters
//!
//! - **Identity**: `PublicKey`, `Address`, `Signature`, commitment key/proof
//! - **Chain**: `Block`, `SlashingProof`
//! - **State**: `Account`

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha3::{Digest, Sha3_256};

use crate::{COMM_KEY_LENGTH, COMM_PROOF_LENGTH};

/// A 32-byte SHA3-256 digest.
pub type Hash = [u8; 32];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// The account identifier: `SHA3-256(public key)`.
///
/// Transactions reference accounts by this hash, and the global state is
/// keyed by it.
pub type Address = [u8; 32];

/// RSA commitment key modulus bytes (fixed public exponent 65537).
pub type CommitmentKey = [u8; COMM_KEY_LENGTH];

/// RSA signature over a block height, binding a validator to that height.
pub type CommitmentProof = [u8; COMM_PROOF_LENGTH];

/// The all-zero hash, used as "absent" marker for optional hash fields.
pub const EMPTY_HASH: Hash = [0u8; 32];

/// Compute the account address for a public key.
pub fn address_of(pub_key: &PublicKey) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update(pub_key);
    hasher.finalize().into()
}

/// An account in the global state.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The account's Ed25519 public key.
    pub address: PublicKey,
    /// Balance in base units.
    pub balance: u64,
    /// Number of funds/iot transactions sent (replay protection).
    pub tx_cnt: u32,
    /// Whether the account takes part in the validator lottery.
    pub is_staking: bool,
    /// RSA commitment key modulus, set by a stake transaction.
    #[serde_as(as = "Bytes")]
    pub commitment_key: CommitmentKey,
    /// Height at which the account last started (or was reset to) staking.
    pub staking_block_height: u32,
    /// Smart contract bytecode, if this is a contract account.
    pub contract: Option<Vec<u8>>,
    /// Persistent contract storage.
    pub contract_variables: Option<Vec<u8>>,
}

impl Account {
    /// Create a fresh, empty account for a public key.
    pub fn new(address: PublicKey) -> Self {
        Self {
            address,
            balance: 0,
            tx_cnt: 0,
            is_staking: false,
            commitment_key: [0u8; COMM_KEY_LENGTH],
            staking_block_height: 0,
            contract: None,
            contract_variables: None,
        }
    }

    /// The account identifier under which this account is stored.
    pub fn id(&self) -> Address {
        address_of(&self.address)
    }

    /// Whether the account carries contract bytecode.
    pub fn is_contract(&self) -> bool {
        self.contract.is_some()
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new([0u8; 32])
    }
}

/// The local slashing dictionary: detected double-signs awaiting inclusion,
/// keyed by the offending address.
pub type SlashingDict = std::collections::HashMap<Address, SlashingProof>;

/// Proof that a validator signed two conflicting blocks within the slashing
/// window. Stored in the slashing dictionary keyed by the slashed address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingProof {
    /// First conflicting block.
    pub conflicting_block_hash1: Hash,
    /// Second conflicting block.
    pub conflicting_block_hash2: Hash,
    /// Without-tx hash of the first conflicting block.
    pub conflicting_block_hash_without_tx1: Hash,
    /// Without-tx hash of the second conflicting block.
    pub conflicting_block_hash_without_tx2: Hash,
}

/// Serialized size of every block field except the six tx-hash sequences.
const BLOCK_HEADER_SIZE: u64 = 658;

/// A block. Transaction payloads are not stored here, only their hashes;
/// payloads live in the content-addressed tx stores.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Final block hash: `SHA3(nonce ‖ partial_hash)`.
    pub hash: Hash,
    /// Hash of the compacted form: `SHA3(nonce ‖ partial_hash_without_merkle)`.
    pub hash_without_tx: Hash,
    /// Hash of the parent block.
    pub prev_hash: Hash,
    /// Without-tx hash of the parent block.
    pub prev_hash_without_tx: Hash,
    /// Proof-of-stake nonce. Doubles as the block timestamp.
    pub nonce: u64,
    /// Unix timestamp; by construction equal to the sortition nonce.
    pub timestamp: i64,
    /// Merkle root over all tx-hash sequences in category order.
    pub merkle_root: Hash,
    /// Account hash of the validator credited with this block's rewards.
    pub beneficiary: Address,
    /// Block height; genesis is 0.
    pub height: u32,
    /// RSA signature over the decimal height string by the beneficiary's
    /// commitment key.
    #[serde_as(as = "Bytes")]
    pub commitment_proof: CommitmentProof,
    /// Address found double-signing, or all-zero when no proof is attached.
    pub slashed_address: Address,
    /// First conflicting block hash of the slashing proof.
    pub conflicting_block_hash1: Hash,
    /// Second conflicting block hash of the slashing proof.
    pub conflicting_block_hash2: Hash,
    /// Without-tx variant of the first conflicting block hash.
    pub conflicting_block_hash_without_tx1: Hash,
    /// Without-tx variant of the second conflicting block hash.
    pub conflicting_block_hash_without_tx2: Hash,
    /// Account transaction count.
    pub nr_acc_tx: u16,
    /// Funds transaction count.
    pub nr_funds_tx: u16,
    /// Config transaction count.
    pub nr_config_tx: u8,
    /// Stake transaction count.
    pub nr_stake_tx: u16,
    /// Aggregate transaction count.
    pub nr_agg_tx: u16,
    /// IoT transaction count.
    pub nr_iot_tx: u16,
    /// Account transaction hashes.
    pub acc_tx_data: Vec<Hash>,
    /// Funds transaction hashes.
    pub funds_tx_data: Vec<Hash>,
    /// Config transaction hashes.
    pub config_tx_data: Vec<Hash>,
    /// Stake transaction hashes.
    pub stake_tx_data: Vec<Hash>,
    /// Aggregate transaction hashes.
    pub agg_tx_data: Vec<Hash>,
    /// IoT transaction hashes.
    pub iot_tx_data: Vec<Hash>,
    /// True once the block was compacted to its without-tx form.
    pub aggregated: bool,
}

impl Default for Block {
    fn default() -> Self {
        Self {
            hash: EMPTY_HASH,
            hash_without_tx: EMPTY_HASH,
            prev_hash: EMPTY_HASH,
            prev_hash_without_tx: EMPTY_HASH,
            nonce: 0,
            timestamp: 0,
            merkle_root: EMPTY_HASH,
            beneficiary: EMPTY_HASH,
            height: 0,
            commitment_proof: [0u8; COMM_PROOF_LENGTH],
            slashed_address: EMPTY_HASH,
            conflicting_block_hash1: EMPTY_HASH,
            conflicting_block_hash2: EMPTY_HASH,
            conflicting_block_hash_without_tx1: EMPTY_HASH,
            conflicting_block_hash_without_tx2: EMPTY_HASH,
            nr_acc_tx: 0,
            nr_funds_tx: 0,
            nr_config_tx: 0,
            nr_stake_tx: 0,
            nr_agg_tx: 0,
            nr_iot_tx: 0,
            acc_tx_data: Vec::new(),
            funds_tx_data: Vec::new(),
            config_tx_data: Vec::new(),
            stake_tx_data: Vec::new(),
            agg_tx_data: Vec::new(),
            iot_tx_data: Vec::new(),
            aggregated: false,
        }
    }
}

impl Block {
    /// Start an empty candidate block on top of the given parent.
    pub fn new(
        prev_hash: Hash,
        prev_hash_without_tx: Hash,
        commitment_proof: CommitmentProof,
        height: u32,
    ) -> Self {
        Self {
            prev_hash,
            prev_hash_without_tx,
            commitment_proof,
            height,
            ..Self::default()
        }
    }

    /// Hash over the header fields that commit to the block content,
    /// including the merkle root. The final block hash is
    /// `SHA3(nonce ‖ partial_hash())`.
    pub fn partial_hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.prev_hash);
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.merkle_root);
        hasher.update(self.beneficiary);
        hasher.update(self.commitment_proof);
        hasher.update(self.slashed_address);
        hasher.update(self.conflicting_block_hash1);
        hasher.update(self.conflicting_block_hash2);
        hasher.finalize().into()
    }

    /// Like [`Self::partial_hash`] but without the merkle root and chained to
    /// the parent's without-tx hash, so compacted ancestors stay linked.
    pub fn partial_hash_without_merkle(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.prev_hash_without_tx);
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.beneficiary);
        hasher.update(self.commitment_proof);
        hasher.update(self.slashed_address);
        hasher.update(self.conflicting_block_hash1);
        hasher.update(self.conflicting_block_hash2);
        hasher.finalize().into()
    }

    /// Fix the sortition nonce and derive both final hashes and the
    /// timestamp from it.
    pub fn seal(&mut self, nonce: u64) {
        self.nonce = nonce;
        self.timestamp = nonce as i64;

        let mut hasher = Sha3_256::new();
        hasher.update(nonce.to_be_bytes());
        hasher.update(self.partial_hash());
        self.hash = hasher.finalize().into();

        let mut hasher = Sha3_256::new();
        hasher.update(nonce.to_be_bytes());
        hasher.update(self.partial_hash_without_merkle());
        self.hash_without_tx = hasher.finalize().into();
    }

    /// Refresh the per-category counts from the hash sequences.
    pub fn update_tx_counts(&mut self) {
        self.nr_acc_tx = self.acc_tx_data.len() as u16;
        self.nr_funds_tx = self.funds_tx_data.len() as u16;
        self.nr_config_tx = self.config_tx_data.len() as u8;
        self.nr_stake_tx = self.stake_tx_data.len() as u16;
        self.nr_agg_tx = self.agg_tx_data.len() as u16;
        self.nr_iot_tx = self.iot_tx_data.len() as u16;
    }

    /// Total number of transaction hashes across all categories.
    pub fn total_tx_count(&self) -> usize {
        self.acc_tx_data.len()
            + self.funds_tx_data.len()
            + self.config_tx_data.len()
            + self.stake_tx_data.len()
            + self.agg_tx_data.len()
            + self.iot_tx_data.len()
    }

    /// Serialized block size in bytes, checked against the `block_size`
    /// parameter.
    pub fn size(&self) -> u64 {
        BLOCK_HEADER_SIZE + 32 * self.total_tx_count() as u64
    }

    /// Whether the block carries a slashing proof.
    pub fn has_slashing_proof(&self) -> bool {
        self.slashed_address != EMPTY_HASH
    }

    /// Stable binary encoding for peer exchange.
    pub fn encode(&self) -> Result<Vec<u8>, crate::wire::CodecError> {
        crate::wire::encode(self)
    }

    /// Decode from the stable binary encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, crate::wire::CodecError> {
        crate::wire::decode(bytes)
    }

    /// The compacted form of this block: tx-hash sequences dropped, counts
    /// kept, `aggregated` set. Stored under [`Self::hash_without_tx`].
    pub fn to_block_without_tx(&self) -> Block {
        let mut stripped = self.clone();
        stripped.acc_tx_data.clear();
        stripped.funds_tx_data.clear();
        stripped.config_tx_data.clear();
        stripped.stake_tx_data.clear();
        stripped.agg_tx_data.clear();
        stripped.iot_tx_data.clear();
        stripped.aggregated = true;
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_sha3_of_pub_key() {
        let account = Account::new([7u8; 32]);
        let mut hasher = Sha3_256::new();
        hasher.update([7u8; 32]);
        let expected: Hash = hasher.finalize().into();
        assert_eq!(account.id(), expected);
    }

    #[test]
    fn test_seal_derives_timestamp_from_nonce() {
        let mut block = Block::new([1u8; 32], [2u8; 32], [0u8; 256], 4);
        block.seal(1_700_000_000);
        assert_eq!(block.timestamp, 1_700_000_000);
        assert_ne!(block.hash, EMPTY_HASH);
        assert_ne!(block.hash, block.hash_without_tx);
    }

    #[test]
    fn test_partial_hash_commits_to_merkle_root() {
        let mut block = Block::new([1u8; 32], [2u8; 32], [0u8; 256], 4);
        let before = block.partial_hash();
        block.merkle_root = [9u8; 32];
        assert_ne!(block.partial_hash(), before);
        // The without-merkle hash must not change.
        let mut other = Block::new([1u8; 32], [2u8; 32], [0u8; 256], 4);
        other.merkle_root = [3u8; 32];
        assert_eq!(
            block.partial_hash_without_merkle(),
            other.partial_hash_without_merkle()
        );
    }

    #[test]
    fn test_without_tx_form_drops_hashes_keeps_counts() {
        let mut block = Block::new([1u8; 32], [2u8; 32], [0u8; 256], 9);
        block.funds_tx_data = vec![[5u8; 32], [6u8; 32]];
        block.update_tx_counts();
        let stripped = block.to_block_without_tx();
        assert!(stripped.funds_tx_data.is_empty());
        assert_eq!(stripped.nr_funds_tx, 2);
        assert!(stripped.aggregated);
    }

    #[test]
    fn test_size_grows_with_tx_hashes() {
        let mut block = Block::default();
        let empty = block.size();
        block.funds_tx_data.push([0u8; 32]);
        assert_eq!(block.size(), empty + 32);
    }
}
