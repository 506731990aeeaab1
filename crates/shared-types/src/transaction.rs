//! # Transaction Model
//!
//! The six transaction variants as a sum type. Every variant exposes a
//! canonical 32-byte SHA3-256 hash over a fixed big-endian field ordering —
//! always excluding the signature and the aggregated flag — plus a stable
//! binary encoding, the fee, and its sender/receiver addresses.
//!
//! Verification is intentionally *not* defined here: whether a signature is
//! acceptable depends on account state (root keys, account public keys), so
//! it is routed through a top-level match in the state subsystem.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha3::{Digest, Sha3_256};

use crate::entities::{Address, CommitmentKey, Hash, PublicKey, Signature};
use crate::wire::{self, CodecError};
use crate::COMM_KEY_LENGTH;

/// Serialized size of a funds transaction, excluding its data payload.
pub const FUNDS_TX_SIZE: u64 = 213;
/// Serialized size of an account transaction.
pub const ACC_TX_SIZE: u64 = 169;
/// Serialized size of a config transaction.
pub const CONFIG_TX_SIZE: u64 = 83;
/// Serialized size of a stake transaction.
pub const STAKE_TX_SIZE: u64 = 373;
/// Serialized size of an iot transaction, excluding its data payload.
pub const IOT_TX_SIZE: u64 = 141;

/// Header bit marking an account transaction as an account removal.
pub const ACC_TX_DELETE: u8 = 0x02;

/// The transaction categories, in the fixed order used for merkle
/// construction and state application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxCategory {
    /// Account creation/removal.
    Acc,
    /// Funds transfer.
    Funds,
    /// System parameter update.
    Config,
    /// Staking flag/commitment key update.
    Stake,
    /// Aggregated funds transfers.
    Agg,
    /// Signed data-only message.
    Iot,
}

impl TxCategory {
    /// All categories in canonical order.
    pub const ALL: [TxCategory; 6] = [
        TxCategory::Acc,
        TxCategory::Funds,
        TxCategory::Config,
        TxCategory::Stake,
        TxCategory::Agg,
        TxCategory::Iot,
    ];
}

impl std::fmt::Display for TxCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TxCategory::Acc => "acc",
            TxCategory::Funds => "funds",
            TxCategory::Config => "config",
            TxCategory::Stake => "stake",
            TxCategory::Agg => "agg",
            TxCategory::Iot => "iot",
        };
        f.write_str(name)
    }
}

/// Creates or removes an account. Signed by a root key.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccTx {
    /// Option bits; `ACC_TX_DELETE` distinguishes removal from creation.
    pub header: u8,
    /// Address of the root account that issued this transaction.
    pub issuer: Address,
    /// Fee paid to the block beneficiary.
    pub fee: u64,
    /// Public key of the account being created or removed.
    pub pub_key: PublicKey,
    /// Root-key signature over the canonical hash.
    #[serde_as(as = "Bytes")]
    pub sig: Signature,
    /// Contract bytecode deployed with the new account.
    pub contract: Option<Vec<u8>>,
    /// Initial contract storage.
    pub contract_variables: Option<Vec<u8>>,
}

impl AccTx {
    /// Canonical hash: header ‖ issuer ‖ fee ‖ pub_key.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update([self.header]);
        hasher.update(self.issuer);
        hasher.update(self.fee.to_be_bytes());
        hasher.update(self.pub_key);
        hasher.finalize().into()
    }

    /// Whether the removal bit is set.
    pub fn is_removal(&self) -> bool {
        self.header & ACC_TX_DELETE == ACC_TX_DELETE
    }

    /// Stable binary encoding.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        wire::encode(self)
    }

    /// Decode from the stable binary encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        wire::decode(bytes)
    }
}

/// Transfers `amount` from sender to receiver.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsTx {
    /// Option bits.
    pub header: u8,
    /// Amount transferred, in base units.
    pub amount: u64,
    /// Fee paid to the block beneficiary.
    pub fee: u64,
    /// Sender's transaction counter at signing time.
    pub tx_cnt: u32,
    /// Sender account address.
    pub from: Address,
    /// Receiver account address.
    pub to: Address,
    /// Sender signature over the canonical hash.
    #[serde_as(as = "Bytes")]
    pub sig: Signature,
    /// Set once the transaction became a member of an aggregate record.
    /// Excluded from the canonical hash.
    pub aggregated: bool,
    /// Contract invocation payload, empty for plain transfers.
    pub data: Vec<u8>,
}

impl FundsTx {
    /// Canonical hash: header ‖ amount ‖ fee ‖ tx_cnt ‖ from ‖ to ‖ data.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update([self.header]);
        hasher.update(self.amount.to_be_bytes());
        hasher.update(self.fee.to_be_bytes());
        hasher.update(self.tx_cnt.to_be_bytes());
        hasher.update(self.from);
        hasher.update(self.to);
        hasher.update(&self.data);
        hasher.finalize().into()
    }

    /// Stable binary encoding.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        wire::encode(self)
    }

    /// Decode from the stable binary encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        wire::decode(bytes)
    }
}

/// Updates the system parameter identified by `id`. Signed by a root key.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTx {
    /// Option bits.
    pub header: u8,
    /// Identifier of the parameter being updated.
    pub id: u8,
    /// New parameter value; must lie within the declared range for `id`.
    pub payload: u64,
    /// Fee paid to the block beneficiary.
    pub fee: u64,
    /// Issuer-side counter, disambiguates otherwise identical updates.
    pub tx_cnt: u8,
    /// Root-key signature over the canonical hash.
    #[serde_as(as = "Bytes")]
    pub sig: Signature,
}

impl ConfigTx {
    /// Canonical hash: header ‖ id ‖ payload ‖ fee ‖ tx_cnt.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update([self.header]);
        hasher.update([self.id]);
        hasher.update(self.payload.to_be_bytes());
        hasher.update(self.fee.to_be_bytes());
        hasher.update([self.tx_cnt]);
        hasher.finalize().into()
    }

    /// Stable binary encoding.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        wire::encode(self)
    }

    /// Decode from the stable binary encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        wire::decode(bytes)
    }
}

/// Sets an account's staking flag and commitment key.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeTx {
    /// Option bits.
    pub header: u8,
    /// Fee paid to the block beneficiary.
    pub fee: u64,
    /// Desired staking flag; must differ from the account's current flag.
    pub is_staking: bool,
    /// Address of the staking account.
    pub account: Address,
    /// Commitment key registered for sortition proofs.
    #[serde_as(as = "Bytes")]
    pub commitment_key: CommitmentKey,
    /// Account signature over the canonical hash.
    #[serde_as(as = "Bytes")]
    pub sig: Signature,
}

impl StakeTx {
    /// Canonical hash: header ‖ fee ‖ is_staking ‖ account ‖ commitment_key.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update([self.header]);
        hasher.update(self.fee.to_be_bytes());
        hasher.update([self.is_staking as u8]);
        hasher.update(self.account);
        hasher.update(self.commitment_key);
        hasher.finalize().into()
    }

    /// Stable binary encoding.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        wire::encode(self)
    }

    /// Decode from the stable binary encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        wire::decode(bytes)
    }
}

/// An aggregation record standing in for several funds transactions that
/// share a sender or a receiver. Carries no signature; its authenticity
/// derives from the member transactions it references.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggTx {
    /// Sum of the member transaction amounts.
    pub amount: u64,
    /// Fee paid to the block beneficiary.
    pub fee: u64,
    /// Deduplicated sender set. A single entry when aggregated by sender.
    pub from: Vec<Address>,
    /// Deduplicated receiver set. A single entry when aggregated by receiver.
    pub to: Vec<Address>,
    /// Canonical hashes of the member funds transactions.
    pub aggregated_tx_slice: Vec<Hash>,
    /// Set once this record itself was folded into a compacted block.
    pub aggregated: bool,
}

impl AggTx {
    /// Canonical hash: amount ‖ fee ‖ from* ‖ to* ‖ members*.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.amount.to_be_bytes());
        hasher.update(self.fee.to_be_bytes());
        for sender in &self.from {
            hasher.update(sender);
        }
        for receiver in &self.to {
            hasher.update(receiver);
        }
        for member in &self.aggregated_tx_slice {
            hasher.update(member);
        }
        hasher.finalize().into()
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> u64 {
        16 + 32 * (self.from.len() + self.to.len() + self.aggregated_tx_slice.len()) as u64
    }

    /// Stable binary encoding.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        wire::encode(self)
    }

    /// Decode from the stable binary encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        wire::decode(bytes)
    }
}

/// A signed data-only message between two accounts. Pays a fee, moves no
/// funds.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IotTx {
    /// Option bits.
    pub header: u8,
    /// Sender's transaction counter at signing time.
    pub tx_cnt: u32,
    /// Sender account address.
    pub from: Address,
    /// Receiver account address.
    pub to: Address,
    /// Sender signature over the canonical hash.
    #[serde_as(as = "Bytes")]
    pub sig: Signature,
    /// Message payload.
    pub data: Vec<u8>,
    /// Fee paid to the block beneficiary.
    pub fee: u64,
}

impl IotTx {
    /// Canonical hash: to ‖ from ‖ tx_cnt ‖ fee ‖ header ‖ data.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.to);
        hasher.update(self.from);
        hasher.update(self.tx_cnt.to_be_bytes());
        hasher.update(self.fee.to_be_bytes());
        hasher.update([self.header]);
        hasher.update(&self.data);
        hasher.finalize().into()
    }

    /// Stable binary encoding.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        wire::encode(self)
    }

    /// Decode from the stable binary encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        wire::decode(bytes)
    }
}

/// A transaction of any category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    /// Account creation/removal.
    Acc(AccTx),
    /// Funds transfer.
    Funds(FundsTx),
    /// System parameter update.
    Config(ConfigTx),
    /// Staking update.
    Stake(StakeTx),
    /// Aggregated funds transfers.
    Agg(AggTx),
    /// Data-only message.
    Iot(IotTx),
}

impl Transaction {
    /// The canonical hash of the inner transaction.
    pub fn hash(&self) -> Hash {
        match self {
            Transaction::Acc(tx) => tx.hash(),
            Transaction::Funds(tx) => tx.hash(),
            Transaction::Config(tx) => tx.hash(),
            Transaction::Stake(tx) => tx.hash(),
            Transaction::Agg(tx) => tx.hash(),
            Transaction::Iot(tx) => tx.hash(),
        }
    }

    /// The fee paid to the block beneficiary.
    pub fn fee(&self) -> u64 {
        match self {
            Transaction::Acc(tx) => tx.fee,
            Transaction::Funds(tx) => tx.fee,
            Transaction::Config(tx) => tx.fee,
            Transaction::Stake(tx) => tx.fee,
            Transaction::Agg(tx) => tx.fee,
            Transaction::Iot(tx) => tx.fee,
        }
    }

    /// The sender address, or the zero address where it is meaningless.
    pub fn sender(&self) -> Address {
        match self {
            Transaction::Acc(_) | Transaction::Config(_) | Transaction::Iot(_) => [0u8; 32],
            Transaction::Funds(tx) => tx.from,
            Transaction::Stake(tx) => tx.account,
            Transaction::Agg(tx) => tx.from.first().copied().unwrap_or([0u8; 32]),
        }
    }

    /// The receiver address, or the zero address where it is meaningless.
    pub fn receiver(&self) -> Address {
        match self {
            Transaction::Acc(_) | Transaction::Config(_) | Transaction::Stake(_)
            | Transaction::Iot(_) => [0u8; 32],
            Transaction::Funds(tx) => tx.to,
            Transaction::Agg(tx) => tx.to.first().copied().unwrap_or([0u8; 32]),
        }
    }

    /// Serialized size in bytes, data payloads included.
    pub fn size(&self) -> u64 {
        match self {
            Transaction::Acc(_) => ACC_TX_SIZE,
            Transaction::Funds(tx) => FUNDS_TX_SIZE + tx.data.len() as u64,
            Transaction::Config(_) => CONFIG_TX_SIZE,
            Transaction::Stake(_) => STAKE_TX_SIZE,
            Transaction::Agg(tx) => tx.size(),
            Transaction::Iot(tx) => IOT_TX_SIZE + tx.data.len() as u64,
        }
    }

    /// The category this transaction belongs to.
    pub fn category(&self) -> TxCategory {
        match self {
            Transaction::Acc(_) => TxCategory::Acc,
            Transaction::Funds(_) => TxCategory::Funds,
            Transaction::Config(_) => TxCategory::Config,
            Transaction::Stake(_) => TxCategory::Stake,
            Transaction::Agg(_) => TxCategory::Agg,
            Transaction::Iot(_) => TxCategory::Iot,
        }
    }

    /// Stable binary encoding, tagged with the category.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        wire::encode(self)
    }

    /// Decode from the tagged binary encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        wire::decode(bytes)
    }
}

impl From<AccTx> for Transaction {
    fn from(tx: AccTx) -> Self {
        Transaction::Acc(tx)
    }
}

impl From<FundsTx> for Transaction {
    fn from(tx: FundsTx) -> Self {
        Transaction::Funds(tx)
    }
}

impl From<ConfigTx> for Transaction {
    fn from(tx: ConfigTx) -> Self {
        Transaction::Config(tx)
    }
}

impl From<StakeTx> for Transaction {
    fn from(tx: StakeTx) -> Self {
        Transaction::Stake(tx)
    }
}

impl From<AggTx> for Transaction {
    fn from(tx: AggTx) -> Self {
        Transaction::Agg(tx)
    }
}

impl From<IotTx> for Transaction {
    fn from(tx: IotTx) -> Self {
        Transaction::Iot(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funds_tx() -> FundsTx {
        FundsTx {
            header: 0,
            amount: 100,
            fee: 1,
            tx_cnt: 0,
            from: [1u8; 32],
            to: [2u8; 32],
            sig: [0u8; 64],
            aggregated: false,
            data: Vec::new(),
        }
    }

    #[test]
    fn test_hash_excludes_signature() {
        let mut tx = funds_tx();
        let unsigned = tx.hash();
        tx.sig = [0xAAu8; 64];
        assert_eq!(tx.hash(), unsigned);
    }

    #[test]
    fn test_hash_excludes_aggregated_flag() {
        let mut tx = funds_tx();
        let before = tx.hash();
        tx.aggregated = true;
        assert_eq!(tx.hash(), before);
    }

    #[test]
    fn test_hash_covers_amount() {
        let mut tx = funds_tx();
        let before = tx.hash();
        tx.amount += 1;
        assert_ne!(tx.hash(), before);
    }

    #[test]
    fn test_funds_round_trip() {
        let tx = FundsTx {
            data: vec![9, 9, 9],
            ..funds_tx()
        };
        let decoded = FundsTx::decode(&tx.encode().unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn test_enum_round_trip_keeps_category() {
        let tx = Transaction::Stake(StakeTx {
            header: 0,
            fee: 2,
            is_staking: true,
            account: [4u8; 32],
            commitment_key: [7u8; 256],
            sig: [1u8; 64],
        });
        let decoded = Transaction::decode(&tx.encode().unwrap()).unwrap();
        assert_eq!(decoded.category(), TxCategory::Stake);
        assert_eq!(decoded, tx);
    }

    #[test]
    fn test_agg_hash_covers_members() {
        let mut tx = AggTx {
            amount: 350,
            fee: 1,
            from: vec![[1u8; 32]],
            to: vec![[2u8; 32], [3u8; 32]],
            aggregated_tx_slice: vec![[9u8; 32]],
            aggregated: false,
        };
        let before = tx.hash();
        tx.aggregated_tx_slice.push([8u8; 32]);
        assert_ne!(tx.hash(), before);
    }

    #[test]
    fn test_iot_hash_order_differs_from_funds() {
        // IotTx hashes receiver-first; a symmetric pair must not collide
        // with the sender-first ordering.
        let iot = IotTx {
            header: 0,
            tx_cnt: 0,
            from: [1u8; 32],
            to: [2u8; 32],
            sig: [0u8; 64],
            data: Vec::new(),
            fee: 1,
        };
        let swapped = IotTx {
            from: [2u8; 32],
            to: [1u8; 32],
            ..iot.clone()
        };
        assert_ne!(iot.hash(), swapped.hash());
    }

    #[test]
    fn test_removal_bit() {
        let tx = AccTx {
            header: ACC_TX_DELETE,
            issuer: [0u8; 32],
            fee: 1,
            pub_key: [5u8; 32],
            sig: [0u8; 64],
            contract: None,
            contract_variables: None,
        };
        assert!(tx.is_removal());
    }
}
