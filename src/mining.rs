//! Candidate block assembly and the nonce-search engine.
//!
//! The engine is deliberately synchronous: it runs on a blocking worker and
//! cooperates with the event loop only through the shared cancel word and
//! its returned outcome.

use crate::block::now_ms;
use crate::constants::{CANCEL_POLL_STRIDE, COINBASE_REWARD};
use crate::hashing::{hash_block, hash_tx, meets_difficulty};
use crate::mempool::Mempool;
use crate::types::{
    Address, Block, BlockData, Difficulty, Hash, Transaction, TxIn, TxOut, UtxoSet,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// Mint the block reward to the miner. The synthetic input carries the
/// block height so coinbases at different heights never share an id.
pub fn make_coinbase(height: u64, address: &Address) -> Transaction {
    let ins = vec![TxIn {
        prev_tx_id: String::new(),
        prev_out_index: height,
        signature: String::new(),
        public_key: String::new(),
    }];
    let outs = vec![TxOut { address: address.clone(), amount: COINBASE_REWARD }];
    let id = hash_tx(&ins, &outs);
    Transaction { id, ins, outs }
}

/// Everything the engine needs to search for a block: the header fields
/// minus the nonce it will discover.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub height: u64,
    pub prev_hash: Hash,
    pub timestamp: u64,
    pub data: BlockData,
    pub difficulty: Difficulty,
}

/// CreateTemplate: ℬ × 𝒰𝒮 × pool → template
///
/// Assemble a candidate on top of `tip`: a coinbase paying the miner at the
/// next height, followed by up to `cap` pool transactions in pool order,
/// skipping any that no longer validate against the snapshot.
pub fn build_template(
    tip: &Block,
    utxos: &UtxoSet,
    pool: &Mempool,
    miner_address: &Address,
    miner_tag: &str,
    difficulty: Difficulty,
    cap: usize,
) -> BlockTemplate {
    let height = tip.height + 1;
    let mut txs = vec![make_coinbase(height, miner_address)];
    txs.extend(pool.candidates(utxos, cap));
    BlockTemplate {
        height,
        prev_hash: tip.hash.clone(),
        timestamp: now_ms().max(tip.timestamp),
        data: BlockData { miner_tag: miner_tag.to_string(), txs },
        difficulty,
    }
}

/// Outcome of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningOutcome {
    Mined(Block),
    Canceled,
}

/// Mine: template × cancel → {mined, canceled}
///
/// Increment the nonce from zero, recomputing the header hash each attempt,
/// until the hash meets the difficulty. The cancel word is polled every
/// `CANCEL_POLL_STRIDE` attempts; the candidate timestamp is refreshed at
/// the same stride so a long search cannot fall behind wall-clock
/// validation on other nodes.
pub fn mine(mut template: BlockTemplate, cancel: &AtomicBool) -> MiningOutcome {
    let floor = template.timestamp;
    let mut nonce: u64 = 0;
    loop {
        if nonce % CANCEL_POLL_STRIDE == 0 {
            if cancel.load(Ordering::Relaxed) {
                return MiningOutcome::Canceled;
            }
            template.timestamp = now_ms().max(floor);
        }
        let hash = hash_block(
            template.height,
            template.timestamp,
            &template.prev_hash,
            &template.data,
            nonce,
            template.difficulty,
        );
        if meets_difficulty(&hash, template.difficulty) {
            return MiningOutcome::Mined(Block {
                height: template.height,
                timestamp: template.timestamp,
                prev_hash: template.prev_hash,
                data: template.data,
                nonce,
                difficulty: template.difficulty,
                hash,
            });
        }
        nonce += 1;
    }
}
