//! Core wire and consensus types.
//!
//! Every struct here serializes field-for-field to the JSON exchanged
//! between nodes and wallets, so the declaration order of fields is part of
//! the protocol: block-data JSON is hashed exactly as `serde_json` renders
//! it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lowercase-hex SHA-256 digest, 64 characters.
pub type Hash = String;

/// Owner of an output: lowercase-hex SHA-256 of a PEM-encoded Ed25519
/// public key.
pub type Address = String;

/// Coin amount.
pub type Amount = u64;

/// Block height.
pub type Height = u64;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// Leading-zero-hex-digit count required of a block hash, 0..=64.
pub type Difficulty = u32;

/// Fork-choice metric: sum of per-block difficulty from genesis to a tip.
pub type CumulativeDifficulty = u128;

/// Transaction input: ℐ = ℍ × ℕ × 𝕊 × 𝕊
///
/// A coinbase input carries `prev_tx_id = ""`, `prev_out_index = height`,
/// and empty signature and public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxIn {
    pub prev_tx_id: String,
    pub prev_out_index: u64,
    pub signature: String,
    pub public_key: String,
}

/// Transaction output: 𝒯 = 𝔸 × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOut {
    pub address: Address,
    pub amount: Amount,
}

/// Transaction: 𝒯𝒳 = ℍ × ℐ* × 𝒯*
///
/// Immutable once constructed; `id` is the SHA-256 of the input and output
/// fields (see `hashing::hash_tx`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Hash,
    pub ins: Vec<TxIn>,
    pub outs: Vec<TxOut>,
}

/// Reference to a single output: 𝒪 = ℍ × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutPoint {
    pub tx_id: Hash,
    pub index: u64,
}

impl OutPoint {
    pub fn new(tx_id: impl Into<Hash>, index: u64) -> Self {
        Self { tx_id: tx_id.into(), index }
    }
}

/// Value held by an unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoEntry {
    pub address: Address,
    pub amount: Amount,
}

/// UTXO set: 𝒰𝒮 = 𝒪 → 𝒰
pub type UtxoSet = HashMap<OutPoint, UtxoEntry>;

/// Wire form of an unspent output, as served to wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub tx_id: Hash,
    pub out_index: u64,
    pub address: Address,
    pub amount: Amount,
}

impl Utxo {
    pub fn from_entry(outpoint: &OutPoint, entry: &UtxoEntry) -> Self {
        Self {
            tx_id: outpoint.tx_id.clone(),
            out_index: outpoint.index,
            address: entry.address.clone(),
            amount: entry.amount,
        }
    }
}

/// Block payload: miner tag plus the ordered transaction list.
///
/// Field order matters: the JSON rendering of this struct is part of the
/// header hash preimage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockData {
    pub miner_tag: String,
    pub txs: Vec<Transaction>,
}

/// Block: ℬ = ℕ × ℕ × ℍ × 𝒟 × ℕ × ℕ × ℍ
///
/// The first transaction of a non-genesis block must be a coinbase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub height: Height,
    pub timestamp: TimestampMs,
    pub prev_hash: Hash,
    pub data: BlockData,
    pub nonce: u64,
    pub difficulty: Difficulty,
    pub hash: Hash,
}

/// Validation verdict carried as data, never as an error: peer-supplied
/// input must not abort the ingest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        ValidationResult::Invalid(reason.into())
    }
}
