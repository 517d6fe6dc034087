//! Invariant tests over the consensus core: conservation of value, header
//! integrity, fork-choice stability, and the wallet signing round trip.

mod common;

use common::{mine_child, Wallet};
use minicoin::block::{check_header, connect_block, genesis_block, replay_chain};
use minicoin::constants::COINBASE_REWARD;
use minicoin::hashing::{hash_block, meets_difficulty};
use minicoin::mempool::Mempool;
use minicoin::reorganization::apply_fork_choice;
use minicoin::transaction::{check_tx, compute_tx_id};
use minicoin::tree::BlockTree;
use minicoin::types::{Block, Utxo, UtxoSet, ValidationResult};

fn replayed(chain: &[Block]) -> UtxoSet {
    let (result, utxos) = replay_chain(chain.iter());
    assert_eq!(result, ValidationResult::Valid);
    utxos
}

fn utxos_of<'a>(utxos: &'a UtxoSet, address: &str) -> Vec<Utxo> {
    utxos
        .iter()
        .filter(|(_, entry)| entry.address == address)
        .map(|(outpoint, entry)| Utxo::from_entry(outpoint, entry))
        .collect()
}

#[test]
fn total_supply_equals_reward_times_height() {
    let miner = Wallet::from_seed(1);
    let mut chain = vec![genesis_block()];
    for _ in 0..4 {
        let tip = chain.last().unwrap();
        chain.push(mine_child(tip, vec![], &miner.address, 1));
    }
    let utxos = replayed(&chain);
    let supply: u64 = utxos.values().map(|e| e.amount).sum();
    assert_eq!(supply, COINBASE_REWARD * 4);
}

#[test]
fn transfers_conserve_total_supply() {
    let alice = Wallet::from_seed(1);
    let bob = Wallet::from_seed(2);

    let genesis = genesis_block();
    let b1 = mine_child(&genesis, vec![], &alice.address, 1);
    let utxos = replayed(&[genesis.clone(), b1.clone()]);

    let sources = utxos_of(&utxos, &alice.address);
    let tx = alice.transfer(&sources, &bob.address, 30);
    let b2 = mine_child(&b1, vec![tx], &alice.address, 1);

    let utxos = replayed(&[genesis, b1, b2]);
    let supply: u64 = utxos.values().map(|e| e.amount).sum();
    assert_eq!(supply, COINBASE_REWARD * 2);

    let bob_total: u64 = utxos_of(&utxos, &bob.address).iter().map(|u| u.amount).sum();
    assert_eq!(bob_total, 30);
}

#[test]
fn accepted_blocks_recompute_and_meet_difficulty() {
    let miner = Wallet::from_seed(1);
    let mut chain = vec![genesis_block()];
    for _ in 0..3 {
        let tip = chain.last().unwrap();
        chain.push(mine_child(tip, vec![], &miner.address, 2));
    }
    for block in &chain[1..] {
        assert!(meets_difficulty(&block.hash, block.difficulty));
        let recomputed = hash_block(
            block.height,
            block.timestamp,
            &block.prev_hash,
            &block.data,
            block.nonce,
            block.difficulty,
        );
        assert_eq!(recomputed, block.hash);
    }
    for pair in chain.windows(2) {
        assert_eq!(
            check_header(&pair[1], &pair[0], 2, pair[1].timestamp),
            ValidationResult::Valid
        );
    }
}

#[test]
fn intra_block_chaining_is_rejected() {
    // A transfer spending an output created earlier in the same block must
    // fail: validation sees the pre-block snapshot.
    let alice = Wallet::from_seed(1);
    let bob = Wallet::from_seed(2);

    let genesis = genesis_block();
    let b1 = mine_child(&genesis, vec![], &alice.address, 1);
    let utxos = replayed(&[genesis.clone(), b1.clone()]);

    let sources = utxos_of(&utxos, &alice.address);
    let first = alice.transfer(&sources, &bob.address, 100);
    let chained_source = Utxo {
        tx_id: first.id.clone(),
        out_index: 0,
        address: bob.address.clone(),
        amount: 100,
    };
    let second = bob.transfer(&[chained_source], &alice.address, 100);

    let b2 = mine_child(&b1, vec![first, second], &alice.address, 1);
    let (result, _) = connect_block(&b2.data.txs, utxos, 2);
    assert!(matches!(result, ValidationResult::Invalid(_)));
}

#[test]
fn duplicate_outpoint_across_block_is_rejected() {
    let alice = Wallet::from_seed(1);
    let bob = Wallet::from_seed(2);
    let carol = Wallet::from_seed(3);

    let genesis = genesis_block();
    let b1 = mine_child(&genesis, vec![], &alice.address, 1);
    let utxos = replayed(&[genesis.clone(), b1.clone()]);

    let sources = utxos_of(&utxos, &alice.address);
    let to_bob = alice.transfer(&sources, &bob.address, 100);
    let to_carol = alice.transfer(&sources, &carol.address, 100);

    let b2 = mine_child(&b1, vec![to_bob, to_carol], &alice.address, 1);
    let (result, _) = connect_block(&b2.data.txs, utxos, 2);
    assert!(matches!(result, ValidationResult::Invalid(_)));
}

#[test]
fn fork_choice_selects_maximum_cumulative_difficulty() {
    let miner_a = Wallet::from_seed(1);
    let miner_b = Wallet::from_seed(2);

    let genesis = genesis_block();
    let a1 = mine_child(&genesis, vec![], &miner_a.address, 1);
    let b1 = mine_child(&genesis, vec![], &miner_b.address, 1);
    let b2 = mine_child(&b1, vec![], &miner_b.address, 1);

    let mut tree = BlockTree::new();
    tree.insert_child(a1.clone());
    tree.set_canonical_tip(a1.hash.clone());
    tree.insert_child(b1.clone());
    tree.insert_child(b2.clone());

    let mut pool = Mempool::new();
    let mut utxos = replayed(&[genesis.clone(), a1.clone()]);

    // The one-block branch cannot displace the equal-difficulty tip.
    let outcome = apply_fork_choice(
        &mut tree,
        &mut pool,
        &mut utxos,
        &b1.hash,
        replayed(&[genesis.clone(), b1.clone()]),
    );
    assert!(!outcome.switched);

    // The two-block branch wins strictly.
    let outcome = apply_fork_choice(
        &mut tree,
        &mut pool,
        &mut utxos,
        &b2.hash,
        replayed(&[genesis, b1, b2.clone()]),
    );
    assert!(outcome.switched);
    assert_eq!(tree.canonical_tip().block.hash, b2.hash);
    assert_eq!(
        tree.canonical_tip().cumulative_difficulty,
        tree.best_cumulative_difficulty()
    );
}

#[test]
fn wallet_round_trip_signs_and_verifies() {
    let wallet = Wallet::generate();
    let payee = Wallet::generate();

    let genesis = genesis_block();
    let b1 = mine_child(&genesis, vec![], &wallet.address, 1);
    let utxos = replayed(&[genesis, b1]);

    let sources = utxos_of(&utxos, &wallet.address);
    assert_eq!(sources.len(), 1);
    let tx = wallet.transfer(&sources, &payee.address, 40);

    assert_eq!(check_tx(&tx, &utxos), ValidationResult::Valid);

    // Tampering with any signed field breaks acceptance.
    let mut bad_amount = tx.clone();
    bad_amount.outs[0].amount = 41;
    assert!(!check_tx(&bad_amount, &utxos).is_valid());

    let mut bad_address = tx.clone();
    bad_address.outs[0].address = wallet.address.clone();
    assert!(!check_tx(&bad_address, &utxos).is_valid());

    let mut bad_index = tx.clone();
    bad_index.ins[0].prev_out_index += 1;
    assert!(!check_tx(&bad_index, &utxos).is_valid());

    // Re-hashing a tampered transaction does not help: the signature no
    // longer covers the new id.
    let mut rehashed = tx.clone();
    rehashed.outs[0].amount = 41;
    rehashed.outs[1].amount -= 1;
    rehashed.id = compute_tx_id(&rehashed);
    assert!(!check_tx(&rehashed, &utxos).is_valid());
}

#[test]
fn genesis_mismatch_rejects_whole_chain() {
    let miner = Wallet::from_seed(1);
    let mut foreign_genesis = genesis_block();
    foreign_genesis.data.miner_tag = "other-network".into();
    foreign_genesis.hash = hash_block(
        0,
        foreign_genesis.timestamp,
        &foreign_genesis.prev_hash,
        &foreign_genesis.data,
        0,
        0,
    );
    let child = mine_child(&foreign_genesis, vec![], &miner.address, 1);
    let (result, _) = replay_chain([&foreign_genesis, &child]);
    assert!(matches!(result, ValidationResult::Invalid(_)));
}

#[test]
fn mempool_invariant_holds_after_submissions() {
    let alice = Wallet::from_seed(1);
    let bob = Wallet::from_seed(2);

    let genesis = genesis_block();
    let b1 = mine_child(&genesis, vec![], &alice.address, 1);
    let b2 = mine_child(&b1, vec![], &bob.address, 1);
    let utxos = replayed(&[genesis, b1, b2]);

    let mut pool = Mempool::new();
    let alice_sources = utxos_of(&utxos, &alice.address);
    let bob_sources = utxos_of(&utxos, &bob.address);
    assert!(pool
        .submit(alice.transfer(&alice_sources, &bob.address, 10), &utxos)
        .is_accepted());
    assert!(pool
        .submit(bob.transfer(&bob_sources, &alice.address, 99), &utxos)
        .is_accepted());

    // Every pooled transaction is valid against the snapshot and pairwise
    // disjoint in consumed outpoints.
    let mut seen = std::collections::HashSet::new();
    for tx in pool.transactions() {
        assert_eq!(check_tx(tx, &utxos), ValidationResult::Valid);
        for tx_in in &tx.ins {
            assert!(seen.insert((tx_in.prev_tx_id.clone(), tx_in.prev_out_index)));
        }
    }
}
