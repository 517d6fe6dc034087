//! Pending transactions awaiting inclusion in a mined block.
//!
//! Pool invariants: every transaction is independently valid against the
//! canonical UTXO snapshot, ids are unique, and no two transactions consume
//! the same outpoint. Insertion order is preserved because the miner
//! selects in pool order.

use crate::transaction::{check_tx, is_coinbase};
use crate::types::{
    Address, Hash, OutPoint, Transaction, Utxo, UtxoSet, ValidationResult,
};
use std::collections::HashSet;

/// Outcome of a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolVerdict {
    Accepted,
    Rejected(String),
}

impl MempoolVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MempoolVerdict::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct Mempool {
    txs: Vec<Transaction>,
    /// Every outpoint consumed by some pool transaction.
    consumed: HashSet<OutPoint>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.txs.iter().any(|tx| tx.id == tx_id)
    }

    /// Pool contents in insertion order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.txs
    }

    /// Submit: 𝒯𝒳 × 𝒰𝒮 → {accepted, rejected}
    ///
    /// Rejects transactions that fail full validation, duplicate a pool id,
    /// or consume an outpoint some pool transaction already consumes (a
    /// within-pool double spend would make block assembly impossible).
    pub fn submit(&mut self, tx: Transaction, utxos: &UtxoSet) -> MempoolVerdict {
        if is_coinbase(&tx) {
            return MempoolVerdict::Rejected("coinbase cannot enter the pool".into());
        }
        if let ValidationResult::Invalid(reason) = check_tx(&tx, utxos) {
            return MempoolVerdict::Rejected(reason);
        }
        if self.contains(&tx.id) {
            return MempoolVerdict::Rejected(format!("tx {} already pooled", tx.id));
        }
        for tx_in in &tx.ins {
            let outpoint =
                OutPoint::new(tx_in.prev_tx_id.clone(), tx_in.prev_out_index);
            if self.consumed.contains(&outpoint) {
                return MempoolVerdict::Rejected(format!(
                    "outpoint {}:{} already consumed by the pool",
                    tx_in.prev_tx_id, tx_in.prev_out_index
                ));
            }
        }
        self.index_inputs(&tx);
        self.txs.push(tx);
        MempoolVerdict::Accepted
    }

    /// Reconcile the pool after the canonical chain changed.
    ///
    /// 1. Drop every transaction whose id was included in the new canonical
    ///    sequence.
    /// 2. Drop survivors that no longer validate against the new UTXO
    ///    snapshot or that now collide on an outpoint.
    /// 3. Re-admit detached transactions that are valid and non-conflicting;
    ///    the rest vanish silently.
    pub fn reconcile(
        &mut self,
        utxos: &UtxoSet,
        included: &HashSet<Hash>,
        detached: &[Transaction],
    ) {
        let survivors = std::mem::take(&mut self.txs);
        self.consumed.clear();
        for tx in survivors {
            if included.contains(&tx.id) {
                continue;
            }
            self.readmit(tx, utxos);
        }
        for tx in detached {
            if is_coinbase(tx) || included.contains(&tx.id) {
                continue;
            }
            self.readmit(tx.clone(), utxos);
        }
    }

    /// Candidate transactions for the next block: pool order, capped, and
    /// re-validated against the snapshot the block will build on. Invalid
    /// entries are skipped, not evicted; reconciliation owns eviction.
    pub fn candidates(&self, utxos: &UtxoSet, cap: usize) -> Vec<Transaction> {
        self.txs
            .iter()
            .filter(|tx| check_tx(tx, utxos).is_valid())
            .take(cap)
            .cloned()
            .collect()
    }

    /// Unspent outputs owned by `address`, minus any outpoint a pool
    /// transaction already consumes, so wallets never reuse pending inputs.
    pub fn available(&self, address: &Address, utxos: &UtxoSet) -> Vec<Utxo> {
        let mut found: Vec<Utxo> = utxos
            .iter()
            .filter(|(outpoint, entry)| {
                entry.address == *address && !self.consumed.contains(outpoint)
            })
            .map(|(outpoint, entry)| Utxo::from_entry(outpoint, entry))
            .collect();
        found.sort_by(|a, b| (&a.tx_id, a.out_index).cmp(&(&b.tx_id, b.out_index)));
        found
    }

    /// Whether some pool transaction consumes this outpoint.
    pub fn consumes(&self, outpoint: &OutPoint) -> bool {
        self.consumed.contains(outpoint)
    }

    fn readmit(&mut self, tx: Transaction, utxos: &UtxoSet) -> bool {
        if !check_tx(&tx, utxos).is_valid() {
            return false;
        }
        if self.contains(&tx.id) {
            return false;
        }
        let conflicting = tx.ins.iter().any(|tx_in| {
            self.consumed.contains(&OutPoint::new(
                tx_in.prev_tx_id.clone(),
                tx_in.prev_out_index,
            ))
        });
        if conflicting {
            return false;
        }
        self.index_inputs(&tx);
        self.txs.push(tx);
        true
    }

    fn index_inputs(&mut self, tx: &Transaction) {
        for tx_in in &tx.ins {
            self.consumed.insert(OutPoint::new(
                tx_in.prev_tx_id.clone(),
                tx_in.prev_out_index,
            ));
        }
    }
}
