//! Fork-choice and canonical-chain switching.
//!
//! The canonical tip is the tree node with the greatest cumulative
//! difficulty; a candidate displaces it only by a strictly greater value,
//! so equal-difficulty re-deliveries never flap the chain. Switching adopts
//! the replayed UTXO state wholesale and repairs the mempool: transactions
//! included by the new sequence leave the pool, transactions stranded on
//! detached blocks come back if they still validate.

use crate::mempool::Mempool;
use crate::tree::BlockTree;
use crate::types::{Hash, Transaction, UtxoSet};
use std::collections::HashSet;

/// What a fork-choice evaluation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgOutcome {
    pub switched: bool,
    pub old_tip: Hash,
    pub new_tip: Hash,
    /// Blocks that left the canonical sequence.
    pub detached: usize,
    /// Blocks of the new sequence that were not canonical before.
    pub attached: usize,
}

impl ReorgOutcome {
    fn unchanged(tip: Hash) -> Self {
        Self {
            switched: false,
            old_tip: tip.clone(),
            new_tip: tip,
            detached: 0,
            attached: 0,
        }
    }
}

/// ForkChoice: tree × pool × 𝒰𝒮 × tip × 𝒰𝒮 → outcome
///
/// `candidate_utxos` is the state produced by replaying the candidate
/// chain from genesis; it becomes canonical only here, and only when the
/// candidate wins strictly.
pub fn apply_fork_choice(
    tree: &mut BlockTree,
    mempool: &mut Mempool,
    utxos: &mut UtxoSet,
    candidate_tip: &Hash,
    candidate_utxos: UtxoSet,
) -> ReorgOutcome {
    let current_tip = tree.canonical_tip().block.hash.clone();
    if *candidate_tip == current_tip {
        return ReorgOutcome::unchanged(current_tip);
    }
    let Some(candidate) = tree.get(candidate_tip) else {
        return ReorgOutcome::unchanged(current_tip);
    };
    let candidate_difficulty = candidate.cumulative_difficulty;
    let current_difficulty = tree.canonical_tip().cumulative_difficulty;

    // Ties keep the earlier-observed tip.
    if candidate_difficulty <= current_difficulty {
        return ReorgOutcome::unchanged(current_tip);
    }

    let Some(new_sequence) = tree.chain_to(candidate_tip) else {
        return ReorgOutcome::unchanged(current_tip);
    };
    let new_hashes: HashSet<Hash> =
        new_sequence.iter().map(|b| b.hash.clone()).collect();
    let included: HashSet<Hash> = new_sequence
        .iter()
        .flat_map(|b| b.data.txs.iter().map(|tx| tx.id.clone()))
        .collect();

    let old_sequence = tree.canonical_chain();
    let old_hashes: HashSet<Hash> =
        old_sequence.iter().map(|b| b.hash.clone()).collect();
    let detached_txs: Vec<Transaction> = old_sequence
        .iter()
        .filter(|b| !new_hashes.contains(&b.hash))
        .flat_map(|b| b.data.txs.iter().cloned())
        .collect();
    let detached = old_hashes.difference(&new_hashes).count();
    let attached = new_hashes.difference(&old_hashes).count();

    tree.set_canonical_tip(candidate_tip.clone());
    *utxos = candidate_utxos;
    mempool.reconcile(utxos, &included, &detached_txs);

    ReorgOutcome {
        switched: true,
        old_tip: current_tip,
        new_tip: candidate_tip.clone(),
        detached,
        attached,
    }
}
