//! Deterministic hashing of block headers and transactions.
//!
//! All digests are SHA-256 rendered as 64 lowercase hex characters. Header
//! and transaction preimages are textual concatenations of the fields in
//! declaration order with no separator, so two nodes agree on a hash
//! exactly when they agree on the serialized fields.

use crate::types::{Address, BlockData, Difficulty, Hash, TxIn, TxOut};
use sha2::{Digest, Sha256};

/// SHA-256 of arbitrary bytes as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// HashBlock: ℕ × ℕ × ℍ × 𝒟 × ℕ × ℕ → ℍ
///
/// Preimage: `height · timestamp · prevHash · JSON(data) · nonce ·
/// difficulty`, concatenated without separators.
pub fn hash_block(
    height: u64,
    timestamp: u64,
    prev_hash: &str,
    data: &BlockData,
    nonce: u64,
    difficulty: Difficulty,
) -> Hash {
    let data_json =
        serde_json::to_string(data).expect("block data has no unserializable values");
    let preimage =
        format!("{height}{timestamp}{prev_hash}{data_json}{nonce}{difficulty}");
    sha256_hex(preimage.as_bytes())
}

/// HashTx: ℐ* × 𝒯* → ℍ
///
/// Preimage: every input's `prevTxId · prevOutIndex`, then every output's
/// `address · amount`, in order. Signatures and public keys are excluded so
/// the id is stable under signing.
pub fn hash_tx(ins: &[TxIn], outs: &[TxOut]) -> Hash {
    let mut preimage = String::new();
    for tx_in in ins {
        preimage.push_str(&tx_in.prev_tx_id);
        preimage.push_str(&tx_in.prev_out_index.to_string());
    }
    for tx_out in outs {
        preimage.push_str(&tx_out.address);
        preimage.push_str(&tx_out.amount.to_string());
    }
    sha256_hex(preimage.as_bytes())
}

/// MeetsDifficulty: ℍ × ℕ → {true, false}
///
/// Holds iff `difficulty == 0`, or `difficulty ∈ [1, 64]` and the first
/// `difficulty` hex digits of the hash are zero.
pub fn meets_difficulty(hash: &str, difficulty: Difficulty) -> bool {
    if difficulty == 0 {
        return true;
    }
    if difficulty > crate::constants::MAX_DIFFICULTY {
        return false;
    }
    hash.len() >= difficulty as usize
        && hash.bytes().take(difficulty as usize).all(|b| b == b'0')
}

/// Derive the address owning an output from the PEM encoding of an Ed25519
/// public key: the PEM text is hashed byte-for-byte.
pub fn address_from_public_key_pem(pem: &str) -> Address {
    sha256_hex(pem.as_bytes())
}
