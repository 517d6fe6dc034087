//! Shared fixtures: a wallet stand-in that generates Ed25519 identities and
//! signs transactions, an in-process transport double wiring nodes together
//! without HTTP, and a deterministic block miner for building fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use pkcs8::{EncodePublicKey, LineEnding};
use minicoin::error::{NodeError, Result};
use minicoin::hashing::address_from_public_key_pem;
use minicoin::mining::{make_coinbase, mine, BlockTemplate, MiningOutcome};
use minicoin::network::{
    BlockPush, BlockPushResponse, PeerListRequest, PeerSender, PingResponse,
    RegisterResponse,
};
use minicoin::transaction::compute_tx_id;
use minicoin::types::{
    Address, Block, BlockData, Transaction, TxIn, TxOut, Utxo,
};
use minicoin::Node;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Client-side key custody, reduced to what the node contract needs: an
/// Ed25519 identity, its derived address, and input signing.
pub struct Wallet {
    key: SigningKey,
    pub pem: String,
    pub address: Address,
}

impl Wallet {
    pub fn from_seed(seed: u8) -> Self {
        Self::from_key(SigningKey::from_bytes(&[seed; 32]))
    }

    pub fn generate() -> Self {
        Self::from_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    fn from_key(key: SigningKey) -> Self {
        let pem = key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("ed25519 public keys always encode");
        let address = address_from_public_key_pem(&pem);
        Self { key, pem, address }
    }

    /// Spend `sources` entirely: `amount` to `recipient`, the remainder
    /// back to this wallet as change.
    pub fn transfer(
        &self,
        sources: &[Utxo],
        recipient: &Address,
        amount: u64,
    ) -> Transaction {
        let total: u64 = sources.iter().map(|u| u.amount).sum();
        assert!(total >= amount, "wallet cannot cover {amount} from {total}");
        let mut outs = vec![TxOut { address: recipient.clone(), amount }];
        if total > amount {
            outs.push(TxOut { address: self.address.clone(), amount: total - amount });
        }
        let ins = sources
            .iter()
            .map(|u| TxIn {
                prev_tx_id: u.tx_id.clone(),
                prev_out_index: u.out_index,
                signature: String::new(),
                public_key: self.pem.clone(),
            })
            .collect();
        let mut tx = Transaction { id: String::new(), ins, outs };
        tx.id = compute_tx_id(&tx);
        self.sign(&mut tx);
        tx
    }

    pub fn sign(&self, tx: &mut Transaction) {
        let message = hex::decode(&tx.id).expect("tx ids are hex");
        let signature = hex::encode(self.key.sign(&message).to_bytes());
        for tx_in in &mut tx.ins {
            tx_in.signature = signature.clone();
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_millis() as u64
}

/// Mine a child of `tip` through the real engine: coinbase to
/// `miner_address` plus the given transfers.
pub fn mine_child(
    tip: &Block,
    transfers: Vec<Transaction>,
    miner_address: &Address,
    difficulty: u32,
) -> Block {
    let height = tip.height + 1;
    let mut txs = vec![make_coinbase(height, miner_address)];
    txs.extend(transfers);
    let template = BlockTemplate {
        height,
        prev_hash: tip.hash.clone(),
        timestamp: now_ms().max(tip.timestamp),
        data: BlockData { miner_tag: "fixture".into(), txs },
        difficulty,
    };
    match mine(template, &AtomicBool::new(false)) {
        MiningOutcome::Mined(block) => block,
        MiningOutcome::Canceled => unreachable!("no cancel was requested"),
    }
}

/// Deliver a block to a node the way a peer would.
pub async fn push_to(node: &Node, block: Block, sender: Option<&str>) -> BlockPushResponse {
    node.handle_block_push(BlockPush {
        block,
        sender: sender.map(str::to_string),
        previous_peers: vec![],
    })
    .await
}

/// In-process peer network: maps URLs to live `Node`s and routes every
/// outbound call directly into them. Unmapped URLs behave like unreachable
/// peers.
#[derive(Default)]
pub struct InProcessNetwork {
    nodes: Mutex<HashMap<String, Node>>,
    pub pushed: Mutex<Vec<(String, BlockPush)>>,
}

impl InProcessNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connect(&self, url: impl Into<String>, node: Node) {
        self.nodes.lock().insert(url.into(), node);
    }

    pub fn disconnect(&self, url: &str) {
        self.nodes.lock().remove(url);
    }

    fn node(&self, url: &str) -> Result<Node> {
        self.nodes
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| NodeError::Transport(format!("{url} unreachable")))
    }

    pub fn pushes_to(&self, url: &str) -> usize {
        self.pushed.lock().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl PeerSender for InProcessNetwork {
    async fn register(
        &self,
        peer: &str,
        request: &PeerListRequest,
    ) -> Result<RegisterResponse> {
        Ok(self.node(peer)?.handle_register(request))
    }

    async fn deregister(&self, peer: &str, request: &PeerListRequest) -> Result<()> {
        self.node(peer)?.handle_deregister(request);
        Ok(())
    }

    async fn ping(&self, peer: &str, _from: &str) -> Result<PingResponse> {
        self.node(peer)?;
        Ok(PingResponse { ok: true, pong: true })
    }

    async fn push_block(
        &self,
        peer: &str,
        push: &BlockPush,
    ) -> Result<BlockPushResponse> {
        let node = self.node(peer)?;
        self.pushed.lock().push((peer.to_string(), push.clone()));
        Ok(node.handle_block_push(push.clone()).await)
    }

    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>> {
        Ok(self.node(peer)?.canonical_chain())
    }

    async fn fetch_block(&self, peer: &str, hash: &str) -> Result<Option<Block>> {
        Ok(self.node(peer)?.block_by_hash(hash))
    }
}

/// Poll until `predicate` holds or the timeout elapses.
pub async fn wait_until<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now()
        + std::time::Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    predicate()
}
