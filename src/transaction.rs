//! Transaction validation against a UTXO snapshot.

use crate::constants::COINBASE_REWARD;
use crate::hashing::{address_from_public_key_pem, hash_tx};
use crate::types::{Hash, Transaction, TxIn, UtxoSet, ValidationResult};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use pkcs8::DecodePublicKey;

/// Recompute a transaction id from its inputs and outputs.
pub fn compute_tx_id(tx: &Transaction) -> Hash {
    hash_tx(&tx.ins, &tx.outs)
}

/// A coinbase is recognized by shape: a single input with an empty previous
/// transaction id. Whether it is a *valid* coinbase is `check_coinbase`'s
/// concern.
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.ins.len() == 1 && tx.ins[0].prev_tx_id.is_empty()
}

/// CheckTransaction: 𝒯𝒳 → {valid, invalid}
///
/// Structural rules only: non-empty inputs and outputs, and the id must
/// equal the recomputed hash of the fields. Field types are enforced at the
/// wire boundary by deserialization.
pub fn check_transaction(tx: &Transaction) -> ValidationResult {
    if tx.ins.is_empty() || tx.outs.is_empty() {
        return ValidationResult::invalid("empty inputs or outputs");
    }
    if compute_tx_id(tx) != tx.id {
        return ValidationResult::invalid(format!("tx id mismatch for {}", tx.id));
    }
    ValidationResult::Valid
}

/// CheckTx: 𝒯𝒳 × 𝒰𝒮 → {valid, invalid}
///
/// Full validation of a transfer against a UTXO snapshot:
/// 1. Structural checks and id recomputation.
/// 2. Every input references an existing UTXO, its public key hashes to
///    that UTXO's address, and its Ed25519 signature covers the hex-decoded
///    bytes of the transaction id.
/// 3. Input amounts and output amounts sum to the same value. No fees, no
///    burns.
pub fn check_tx(tx: &Transaction, utxos: &UtxoSet) -> ValidationResult {
    if let ValidationResult::Invalid(reason) = check_transaction(tx) {
        return ValidationResult::Invalid(reason);
    }

    // Sum into u128 so hostile amounts cannot overflow the comparison.
    let mut total_in: u128 = 0;
    for (i, tx_in) in tx.ins.iter().enumerate() {
        let outpoint =
            crate::types::OutPoint::new(tx_in.prev_tx_id.clone(), tx_in.prev_out_index);
        let Some(entry) = utxos.get(&outpoint) else {
            return ValidationResult::invalid(format!(
                "input {i} references unknown utxo {}:{}",
                tx_in.prev_tx_id, tx_in.prev_out_index
            ));
        };
        if address_from_public_key_pem(&tx_in.public_key) != entry.address {
            return ValidationResult::invalid(format!(
                "input {i} public key does not own address {}",
                entry.address
            ));
        }
        if !verify_input_signature(tx_in, &tx.id) {
            return ValidationResult::invalid(format!("input {i} signature invalid"));
        }
        total_in += u128::from(entry.amount);
    }

    let total_out: u128 = tx.outs.iter().map(|o| u128::from(o.amount)).sum();
    if total_in != total_out {
        return ValidationResult::invalid(format!(
            "amounts not conserved: in {total_in}, out {total_out}"
        ));
    }

    ValidationResult::Valid
}

/// CheckCoinbase: 𝒯𝒳 × ℕ → {valid, invalid}
///
/// A coinbase at height h has exactly one input `("", h, "", "")`, exactly
/// one output minting the block reward, and a matching id.
pub fn check_coinbase(tx: &Transaction, height: u64) -> ValidationResult {
    if tx.ins.len() != 1 {
        return ValidationResult::invalid("coinbase must have exactly one input");
    }
    let tx_in = &tx.ins[0];
    if !tx_in.prev_tx_id.is_empty() {
        return ValidationResult::invalid("coinbase input must not reference a utxo");
    }
    if tx_in.prev_out_index != height {
        return ValidationResult::invalid(format!(
            "coinbase input index {} does not match height {height}",
            tx_in.prev_out_index
        ));
    }
    if !tx_in.signature.is_empty() || !tx_in.public_key.is_empty() {
        return ValidationResult::invalid("coinbase input must be unsigned");
    }
    if tx.outs.len() != 1 {
        return ValidationResult::invalid("coinbase must have exactly one output");
    }
    if tx.outs[0].amount != COINBASE_REWARD {
        return ValidationResult::invalid(format!(
            "coinbase output {} does not match reward {COINBASE_REWARD}",
            tx.outs[0].amount
        ));
    }
    if compute_tx_id(tx) != tx.id {
        return ValidationResult::invalid("coinbase id mismatch");
    }
    ValidationResult::Valid
}

/// The signed message is the transaction id interpreted as hex-decoded
/// bytes, verified under the input's PEM-encoded public key.
fn verify_input_signature(tx_in: &TxIn, tx_id: &str) -> bool {
    let Ok(key) = VerifyingKey::from_public_key_pem(&tx_in.public_key) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(&tx_in.signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    let Ok(message) = hex::decode(tx_id) else {
        return false;
    };
    key.verify(&message, &signature).is_ok()
}
