//! Block-level validation: header rules, applying a block's transactions to
//! a UTXO set, and full-chain replay.

use crate::constants::{GENESIS_PREV_HASH, GENESIS_TIMESTAMP, MAX_FUTURE_DRIFT_MS};
use crate::hashing::{hash_block, meets_difficulty};
use crate::transaction::{check_coinbase, check_tx};
use crate::types::{
    Block, BlockData, Difficulty, OutPoint, Transaction, UtxoEntry, UtxoSet,
    ValidationResult,
};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The hardcoded genesis block, identical on every node. Any chain whose
/// first block differs is rejected.
pub fn genesis_block() -> Block {
    let data = BlockData { miner_tag: String::new(), txs: vec![] };
    let hash = hash_block(0, GENESIS_TIMESTAMP, GENESIS_PREV_HASH, &data, 0, 0);
    Block {
        height: 0,
        timestamp: GENESIS_TIMESTAMP,
        prev_hash: GENESIS_PREV_HASH.to_string(),
        data,
        nonce: 0,
        difficulty: 0,
        hash,
    }
}

/// CheckHeader: ℬ × ℬ × ℕ × ℕ → {valid, invalid}
///
/// Validate a block relative to its parent and the node's fixed difficulty:
/// consecutive height, matching parent hash, the shared difficulty value, a
/// header hash that recomputes and meets the difficulty, and a timestamp
/// between the parent's and `now + drift`.
pub fn check_header(
    block: &Block,
    parent: &Block,
    difficulty: Difficulty,
    now: u64,
) -> ValidationResult {
    if block.height != parent.height + 1 {
        return ValidationResult::invalid(format!(
            "height {} does not follow parent height {}",
            block.height, parent.height
        ));
    }
    if block.prev_hash != parent.hash {
        return ValidationResult::invalid("prevHash does not match parent hash");
    }
    if block.difficulty != difficulty {
        return ValidationResult::invalid(format!(
            "difficulty {} differs from network difficulty {difficulty}",
            block.difficulty
        ));
    }
    let recomputed = hash_block(
        block.height,
        block.timestamp,
        &block.prev_hash,
        &block.data,
        block.nonce,
        block.difficulty,
    );
    if recomputed != block.hash {
        return ValidationResult::invalid("header hash does not recompute");
    }
    if !meets_difficulty(&block.hash, difficulty) {
        return ValidationResult::invalid("header hash does not meet difficulty");
    }
    if block.timestamp < parent.timestamp {
        return ValidationResult::invalid("timestamp earlier than parent");
    }
    if block.timestamp > now + MAX_FUTURE_DRIFT_MS {
        return ValidationResult::invalid("timestamp too far in the future");
    }
    ValidationResult::Valid
}

/// ConnectBlock: 𝒯𝒳* × 𝒰𝒮 × ℕ → {valid, invalid} × 𝒰𝒮
///
/// Apply a block's transactions to a UTXO snapshot:
/// 1. Genesis carries no transactions and leaves the set untouched.
/// 2. The first transaction must be a coinbase for this height.
/// 3. No outpoint may be consumed twice across the whole block.
/// 4. Every transfer validates against the snapshot as it was *before* the
///    block, so outputs created here cannot be spent here.
/// 5. The new set drops every consumed outpoint and gains every output.
///
/// On invalid input the snapshot is returned unchanged.
pub fn connect_block(
    txs: &[Transaction],
    utxo_set: UtxoSet,
    height: u64,
) -> (ValidationResult, UtxoSet) {
    if height == 0 {
        if txs.is_empty() {
            return (ValidationResult::Valid, utxo_set);
        }
        return (
            ValidationResult::invalid("genesis must not carry transactions"),
            utxo_set,
        );
    }

    let Some(coinbase) = txs.first() else {
        return (
            ValidationResult::invalid("block must start with a coinbase"),
            utxo_set,
        );
    };
    if let ValidationResult::Invalid(reason) = check_coinbase(coinbase, height) {
        return (ValidationResult::Invalid(reason), utxo_set);
    }

    // Intra-block double spends: collect every referenced outpoint across
    // the transfers and reject on the first repeat.
    let mut consumed = HashSet::new();
    for tx in &txs[1..] {
        for tx_in in &tx.ins {
            let outpoint =
                OutPoint::new(tx_in.prev_tx_id.clone(), tx_in.prev_out_index);
            if !consumed.insert(outpoint) {
                return (
                    ValidationResult::invalid(format!(
                        "outpoint {}:{} consumed twice in one block",
                        tx_in.prev_tx_id, tx_in.prev_out_index
                    )),
                    utxo_set,
                );
            }
        }
    }

    for (i, tx) in txs[1..].iter().enumerate() {
        if let ValidationResult::Invalid(reason) = check_tx(tx, &utxo_set) {
            return (
                ValidationResult::Invalid(format!("tx {}: {reason}", i + 1)),
                utxo_set,
            );
        }
    }

    let mut next = utxo_set;
    for outpoint in consumed {
        next.remove(&outpoint);
    }
    for tx in txs {
        for (index, out) in tx.outs.iter().enumerate() {
            next.insert(
                OutPoint::new(tx.id.clone(), index as u64),
                UtxoEntry { address: out.address.clone(), amount: out.amount },
            );
        }
    }

    (ValidationResult::Valid, next)
}

/// ReplayChain: ℬ* → {valid, invalid} × 𝒰𝒮
///
/// Rebuild UTXO state by applying every block in order starting from an
/// empty set. The chain must begin with the hardcoded genesis; the caller
/// has already checked parent linkage.
pub fn replay_chain<'a, I>(chain: I) -> (ValidationResult, UtxoSet)
where
    I: IntoIterator<Item = &'a Block>,
{
    let mut iter = chain.into_iter();
    let Some(first) = iter.next() else {
        return (ValidationResult::invalid("empty chain"), UtxoSet::new());
    };
    if *first != genesis_block() {
        return (
            ValidationResult::invalid("chain does not start at genesis"),
            UtxoSet::new(),
        );
    }

    let mut utxos = UtxoSet::new();
    for block in iter {
        let (result, next) = connect_block(&block.data.txs, utxos, block.height);
        match result {
            ValidationResult::Valid => utxos = next,
            ValidationResult::Invalid(reason) => {
                return (
                    ValidationResult::Invalid(format!(
                        "block {} at height {}: {reason}",
                        block.hash, block.height
                    )),
                    next,
                );
            }
        }
    }
    (ValidationResult::Valid, utxos)
}
