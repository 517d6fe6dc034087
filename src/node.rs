//! The node: single owner of all core state, and the orchestration of
//! ingest, gossip, sync, and mining around it.
//!
//! Every state transition (block ingest with orphan draining and
//! fork-choice, mempool admission, chain adoption) happens inside one
//! mutex acquisition and never spans an `await`, so each message is a
//! transaction: errors local to one message cannot corrupt core state.

use crate::block::{check_header, genesis_block, now_ms, replay_chain};
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::mempool::{Mempool, MempoolVerdict};
use crate::miner::{self, MinerCommand, MinerHandle};
use crate::mining::{self, BlockTemplate};
use crate::network::{
    BlockPush, BlockPushResponse, NodeInfoResponse, PeerListRequest, PeerSender,
    PushStatus, RegisterResponse,
};
use crate::reorganization::{apply_fork_choice, ReorgOutcome};
use crate::tree::BlockTree;
use crate::types::{Block, CumulativeDifficulty, Hash, Transaction, Utxo, UtxoSet};
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Core state, owned exclusively by the node's mutex.
pub struct NodeState {
    pub tree: BlockTree,
    pub utxos: UtxoSet,
    pub mempool: Mempool,
    pub peers: BTreeSet<String>,
}

impl NodeState {
    fn new() -> Self {
        Self {
            tree: BlockTree::new(),
            utxos: UtxoSet::new(),
            mempool: Mempool::new(),
            peers: BTreeSet::new(),
        }
    }
}

/// Verdict for a single block fed to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
enum IngestStatus {
    Accepted,
    Ignored,
    Orphaned,
    Invalid(String),
}

/// What one ingest (including orphan draining) did to the node.
struct IngestEffects {
    status: IngestStatus,
    tip_changed: bool,
    reorgs: Vec<ReorgOutcome>,
    accepted: usize,
}

struct NodeShared {
    config: NodeConfig,
    state: Mutex<NodeState>,
    sender: Arc<dyn PeerSender>,
    mining_enabled: AtomicBool,
    miner: MinerHandle,
    miner_commands: Mutex<Option<mpsc::UnboundedReceiver<MinerCommand>>>,
}

#[derive(Clone)]
pub struct Node {
    shared: Arc<NodeShared>,
}

impl Node {
    pub fn new(config: NodeConfig, sender: Arc<dyn PeerSender>) -> Self {
        let (miner, commands) = miner::channel();
        let mining = config.mining;
        Self {
            shared: Arc::new(NodeShared {
                config,
                state: Mutex::new(NodeState::new()),
                sender,
                mining_enabled: AtomicBool::new(mining),
                miner,
                miner_commands: Mutex::new(Some(commands)),
            }),
        }
    }

    /// Spawn the miner driver and the peer liveness timer. Idempotent: the
    /// driver command channel can only be claimed once.
    pub fn start(&self) {
        if let Some(commands) = self.shared.miner_commands.lock().take() {
            tokio::spawn(miner::run_driver(self.clone(), commands));
        }
        let node = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(30));
            interval.tick().await;
            loop {
                interval.tick().await;
                node.ping_peers().await;
            }
        });
    }

    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    // ------------------------------------------------------------------
    // Block ingest
    // ------------------------------------------------------------------

    /// Handle a block push from a peer, the miner, or orphan repair.
    ///
    /// The core transition runs under the lock; rebroadcast, parent fetch,
    /// and sync run after it is released.
    pub fn handle_block_push(
        &self,
        push: BlockPush,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = BlockPushResponse> + Send + '_>> {
        Box::pin(self.handle_block_push_inner(push))
    }

    async fn handle_block_push_inner(&self, push: BlockPush) -> BlockPushResponse {
        let BlockPush { block, sender, previous_peers } = push;
        let own_url = &self.shared.config.url;
        let already_visited = previous_peers.iter().any(|p| p == own_url);
        let block_hash = block.hash.clone();
        let parent_hash = block.prev_hash.clone();

        let effects = {
            let mut state = self.shared.state.lock();
            self.ingest_with_orphans(&mut state, block.clone())
        };

        for reorg in &effects.reorgs {
            if reorg.detached > 0 {
                info!(
                    old_tip = %reorg.old_tip,
                    new_tip = %reorg.new_tip,
                    detached = reorg.detached,
                    attached = reorg.attached,
                    "chain reorganized"
                );
            } else {
                debug!(new_tip = %reorg.new_tip, "canonical tip extended");
            }
        }
        if effects.tip_changed {
            self.shared.miner.schedule_restart();
        }

        match effects.status {
            IngestStatus::Accepted => {
                debug!(hash = %block_hash, drained = effects.accepted - 1, "block accepted");
                if !already_visited {
                    self.broadcast_block(block, sender, previous_peers).await;
                }
                BlockPushResponse { status: PushStatus::Accepted, reason: None }
            }
            IngestStatus::Ignored => {
                BlockPushResponse { status: PushStatus::Ignored, reason: None }
            }
            IngestStatus::Orphaned => {
                debug!(hash = %block_hash, parent = %parent_hash, "orphan stored, repairing");
                let node = self.clone();
                tokio::spawn(async move {
                    node.repair_gap(parent_hash, sender).await;
                });
                BlockPushResponse { status: PushStatus::Gap, reason: None }
            }
            IngestStatus::Invalid(reason) => {
                warn!(hash = %block_hash, %reason, "block rejected");
                BlockPushResponse {
                    status: PushStatus::Invalid,
                    reason: Some(reason),
                }
            }
        }
    }

    /// Ingest one block, then iteratively drain every orphan that was
    /// waiting on something newly inserted.
    fn ingest_with_orphans(&self, state: &mut NodeState, block: Block) -> IngestEffects {
        let tip_before = state.tree.canonical_tip().block.hash.clone();
        let mut reorgs = Vec::new();
        let mut accepted = 0;

        let status = self.ingest_one(state, block.clone(), &mut reorgs);
        if status == IngestStatus::Accepted {
            accepted += 1;
            let mut queue: VecDeque<Block> =
                state.tree.take_orphans_of(&block.hash).into();
            while let Some(orphan) = queue.pop_front() {
                let orphan_hash = orphan.hash.clone();
                if self.ingest_one(state, orphan, &mut reorgs) == IngestStatus::Accepted
                {
                    accepted += 1;
                    queue.extend(state.tree.take_orphans_of(&orphan_hash));
                }
            }
        }

        let tip_changed = state.tree.canonical_tip().block.hash != tip_before;
        IngestEffects { status, tip_changed, reorgs, accepted }
    }

    /// IngestBlock: ℬ → {accepted, ignored, orphaned, invalid}
    ///
    /// Parent-relative validation, full candidate replay from genesis, tree
    /// insertion, and fork-choice. Rejected blocks are not stored;
    /// rejection is terminal for that hash in the sense that re-delivery
    /// fails the same checks again.
    fn ingest_one(
        &self,
        state: &mut NodeState,
        block: Block,
        reorgs: &mut Vec<ReorgOutcome>,
    ) -> IngestStatus {
        if state.tree.contains(&block.hash) {
            return IngestStatus::Ignored;
        }
        if block.height == 0 {
            return IngestStatus::Invalid("genesis is hardcoded".into());
        }
        let Some(parent_block) =
            state.tree.get(&block.prev_hash).map(|n| n.block.clone())
        else {
            state.tree.add_orphan(block);
            return IngestStatus::Orphaned;
        };

        if let crate::types::ValidationResult::Invalid(reason) = check_header(
            &block,
            &parent_block,
            self.shared.config.difficulty,
            now_ms(),
        ) {
            return IngestStatus::Invalid(reason);
        }

        // Candidate chain replay from the hardcoded genesis; the resulting
        // UTXO state is kept only for this tip and adopted on switch.
        let candidate_utxos = {
            let Some(parent_chain) = state.tree.chain_to(&block.prev_hash) else {
                return IngestStatus::Invalid("parent not rooted at genesis".into());
            };
            let (result, utxos) = replay_chain(
                parent_chain.into_iter().chain(std::iter::once(&block)),
            );
            if let crate::types::ValidationResult::Invalid(reason) = result {
                return IngestStatus::Invalid(reason);
            }
            utxos
        };

        state.tree.insert_child(block.clone());
        let outcome = apply_fork_choice(
            &mut state.tree,
            &mut state.mempool,
            &mut state.utxos,
            &block.hash,
            candidate_utxos,
        );
        if outcome.switched {
            reorgs.push(outcome);
        }
        IngestStatus::Accepted
    }

    /// Forward an accepted block to peers, appending this node to the
    /// loop-prevention trail and skipping everyone who already saw it.
    async fn broadcast_block(
        &self,
        block: Block,
        origin: Option<String>,
        mut trail: Vec<String>,
    ) {
        let own_url = self.shared.config.url.clone();
        trail.push(own_url.clone());
        let peers: Vec<String> = {
            let state = self.shared.state.lock();
            state.peers.iter().cloned().collect()
        };
        for peer in peers {
            if trail.iter().any(|p| *p == peer) || origin.as_deref() == Some(peer.as_str()) {
                continue;
            }
            let push = BlockPush {
                block: block.clone(),
                sender: Some(own_url.clone()),
                previous_peers: trail.clone(),
            };
            if let Err(err) = self.shared.sender.push_block(&peer, &push).await {
                warn!(%peer, %err, "block broadcast failed");
            }
        }
    }

    /// Orphan repair: fetch the missing parent by hash from any peer, and
    /// pull the full chain from whoever sent the detached block.
    async fn repair_gap(&self, missing_parent: Hash, block_sender: Option<String>) {
        if let Some(peer) = block_sender {
            self.sync_from_peer(&peer).await;
        }
        // The parent may have arrived through the sync; check before
        // bothering the peer set.
        let still_missing = {
            let state = self.shared.state.lock();
            !state.tree.contains(&missing_parent)
        };
        if !still_missing {
            return;
        }
        let peers: Vec<String> = {
            let state = self.shared.state.lock();
            state.peers.iter().cloned().collect()
        };
        let own_url = self.shared.config.url.clone();
        for peer in peers {
            match self.shared.sender.fetch_block(&peer, &missing_parent).await {
                Ok(Some(block)) => {
                    // Re-ingest through the normal path; the trail already
                    // contains this node so the fetched block is not
                    // re-gossiped.
                    let push = BlockPush {
                        block,
                        sender: Some(peer),
                        previous_peers: vec![own_url.clone()],
                    };
                    self.handle_block_push(push).await;
                    return;
                }
                Ok(None) => {}
                Err(err) => warn!(%peer, %err, "parent fetch failed"),
            }
        }
        debug!(parent = %missing_parent, "no peer knows the missing parent");
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Submit a transaction into the mempool. On acceptance the miner is
    /// asked to restart so the next candidate carries it.
    pub fn submit_transaction(
        &self,
        tx: Transaction,
    ) -> std::result::Result<Hash, String> {
        let tx_id = tx.id.clone();
        let verdict = {
            let mut state = self.shared.state.lock();
            let NodeState { mempool, utxos, .. } = &mut *state;
            mempool.submit(tx, utxos)
        };
        match verdict {
            MempoolVerdict::Accepted => {
                debug!(%tx_id, "transaction pooled");
                self.shared.miner.schedule_restart();
                Ok(tx_id)
            }
            MempoolVerdict::Rejected(reason) => {
                debug!(%tx_id, %reason, "transaction rejected");
                Err(reason)
            }
        }
    }

    // ------------------------------------------------------------------
    // Peers and sync
    // ------------------------------------------------------------------

    /// Inbound registration: learn the URLs and reveal the current peer
    /// list so the registrant can merge it.
    pub fn handle_register(&self, request: &PeerListRequest) -> RegisterResponse {
        let own_url = &self.shared.config.url;
        let urls = request.all_urls();
        let peers = {
            let mut state = self.shared.state.lock();
            for url in &urls {
                if url != own_url && state.peers.insert(url.clone()) {
                    info!(peer = %url, "peer registered");
                }
            }
            state.peers.iter().cloned().collect()
        };
        RegisterResponse {
            ok: true,
            urls,
            responder: own_url.clone(),
            peers,
        }
    }

    /// Deregistration removes the URLs locally only.
    pub fn handle_deregister(&self, request: &PeerListRequest) -> RegisterResponse {
        let urls = request.all_urls();
        let peers = {
            let mut state = self.shared.state.lock();
            for url in &urls {
                if state.peers.remove(url) {
                    info!(peer = %url, "peer deregistered");
                }
            }
            state.peers.iter().cloned().collect()
        };
        RegisterResponse {
            ok: true,
            urls,
            responder: self.shared.config.url.clone(),
            peers,
        }
    }

    /// Outbound registration at `peer`: announce ourselves, merge the peer
    /// list we get back, then catch up on its chain.
    pub async fn register_with_peer(&self, peer: &str) {
        let own_url = self.shared.config.url.clone();
        let request = PeerListRequest::single(own_url.clone());
        match self.shared.sender.register(peer, &request).await {
            Ok(response) => {
                self.merge_peer_list(peer, &own_url, response.peers);
                info!(%peer, "registered with peer");
                self.sync_from_peer(peer).await;
            }
            Err(err) => warn!(%peer, %err, "peer registration failed"),
        }
    }

    fn merge_peer_list(&self, peer: &str, own_url: &str, peers: Vec<String>) {
        let mut state = self.shared.state.lock();
        state.peers.insert(peer.to_string());
        for url in peers {
            if url != own_url {
                state.peers.insert(url);
            }
        }
    }

    /// Fetch the peer's full chain and adopt it when it strictly beats the
    /// local one.
    pub async fn sync_from_peer(&self, peer: &str) {
        match self.shared.sender.fetch_chain(peer).await {
            Ok(chain) => match self.adopt_chain_if_better(chain) {
                Ok(true) => info!(%peer, "adopted remote chain"),
                Ok(false) => debug!(%peer, "remote chain not better"),
                Err(reason) => warn!(%peer, %reason, "remote chain rejected"),
            },
            Err(err) => warn!(%peer, %err, "chain fetch failed"),
        }
    }

    /// Validate a linear chain end-to-end and replace canonical state when
    /// its cumulative difficulty strictly exceeds the local tip's. Side
    /// branches and orphans are discarded: the tree is rebuilt from the
    /// received chain.
    pub fn adopt_chain_if_better(&self, chain: Vec<Block>) -> Result<bool> {
        if chain.is_empty() {
            return Err(NodeError::ChainRejected("empty chain".into()));
        }
        if chain[0] != genesis_block() {
            return Err(NodeError::ChainRejected(
                "chain does not start at the hardcoded genesis".into(),
            ));
        }
        let now = now_ms();
        for pair in chain.windows(2) {
            if let crate::types::ValidationResult::Invalid(reason) =
                check_header(&pair[1], &pair[0], self.shared.config.difficulty, now)
            {
                return Err(NodeError::ChainRejected(format!(
                    "block {}: {reason}",
                    pair[1].hash
                )));
            }
        }
        let (result, remote_utxos) = replay_chain(chain.iter());
        if let crate::types::ValidationResult::Invalid(reason) = result {
            return Err(NodeError::ChainRejected(reason));
        }
        let remote_difficulty: CumulativeDifficulty = chain
            .iter()
            .map(|b| CumulativeDifficulty::from(b.difficulty))
            .sum();

        let adopted = {
            let mut state = self.shared.state.lock();
            let local_difficulty = state.tree.canonical_tip().cumulative_difficulty;
            if remote_difficulty <= local_difficulty {
                false
            } else {
                let included: std::collections::HashSet<Hash> = chain
                    .iter()
                    .flat_map(|b| b.data.txs.iter().map(|tx| tx.id.clone()))
                    .collect();
                let new_hashes: std::collections::HashSet<Hash> =
                    chain.iter().map(|b| b.hash.clone()).collect();
                let detached: Vec<Transaction> = state
                    .tree
                    .canonical_chain()
                    .iter()
                    .filter(|b| !new_hashes.contains(&b.hash))
                    .flat_map(|b| b.data.txs.iter().cloned())
                    .collect();

                let NodeState { tree, utxos, mempool, .. } = &mut *state;
                *tree = BlockTree::from_linear_chain(chain);
                *utxos = remote_utxos;
                mempool.reconcile(utxos, &included, &detached);
                true
            }
        };
        if adopted {
            self.shared.miner.schedule_restart();
        }
        Ok(adopted)
    }

    async fn ping_peers(&self) {
        let peers: Vec<String> = {
            let state = self.shared.state.lock();
            state.peers.iter().cloned().collect()
        };
        let own_url = &self.shared.config.url;
        for peer in peers {
            if let Err(err) = self.shared.sender.ping(&peer, own_url).await {
                // Unreachable peers stay registered; the next ping or
                // broadcast retries.
                warn!(%peer, %err, "peer ping failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Mining control
    // ------------------------------------------------------------------

    pub fn mining_enabled(&self) -> bool {
        self.shared.mining_enabled.load(Ordering::Relaxed)
    }

    fn mining_status_str(on: bool) -> String {
        if on { "running".into() } else { "stopped".into() }
    }

    pub fn mining_status(&self) -> String {
        Self::mining_status_str(self.mining_enabled())
    }

    pub fn start_mining(&self) -> (String, String) {
        let old = self.shared.mining_enabled.swap(true, Ordering::Relaxed);
        self.shared.miner.set_enabled(true);
        (Self::mining_status_str(old), Self::mining_status_str(true))
    }

    pub fn stop_mining(&self) -> (String, String) {
        let old = self.shared.mining_enabled.swap(false, Ordering::Relaxed);
        self.shared.miner.set_enabled(false);
        (Self::mining_status_str(old), Self::mining_status_str(false))
    }

    pub fn restart_mining(&self) -> (String, String) {
        let old = self.shared.mining_enabled.swap(true, Ordering::Relaxed);
        self.shared.miner.set_enabled(true);
        self.shared.miner.schedule_restart();
        (Self::mining_status_str(old), Self::mining_status_str(true))
    }

    /// Snapshot a mining candidate on the current canonical tip.
    pub(crate) fn build_mining_template(&self) -> BlockTemplate {
        let state = self.shared.state.lock();
        mining::build_template(
            &state.tree.canonical_tip().block,
            &state.utxos,
            &state.mempool,
            &self.shared.config.miner_address,
            &self.shared.config.miner_tag,
            self.shared.config.difficulty,
            self.shared.config.block_tx_cap,
        )
    }

    /// A mined block enters through the same path as an external one, so
    /// validation, fork-choice, and broadcast are shared.
    pub(crate) async fn ingest_mined_block(&self, block: Block) {
        info!(hash = %block.hash, height = block.height, "mined block");
        let push = BlockPush { block, sender: None, previous_peers: vec![] };
        let response = self.handle_block_push(push).await;
        if response.status != PushStatus::Accepted {
            warn!(status = ?response.status, reason = ?response.reason,
                "locally mined block was not accepted");
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn canonical_chain(&self) -> Vec<Block> {
        let state = self.shared.state.lock();
        state.tree.canonical_chain().into_iter().cloned().collect()
    }

    pub fn latest_block(&self) -> Block {
        let state = self.shared.state.lock();
        state.tree.canonical_tip().block.clone()
    }

    /// Point lookup across every branch, not just the canonical chain.
    pub fn block_by_hash(&self, hash: &str) -> Option<Block> {
        let state = self.shared.state.lock();
        state.tree.get(hash).map(|node| node.block.clone())
    }

    pub fn unspent(&self, address: &str) -> Vec<Utxo> {
        let state = self.shared.state.lock();
        state.mempool.available(&address.to_string(), &state.utxos)
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.unspent(address).iter().map(|u| u.amount).sum()
    }

    pub fn pooled_transactions(&self) -> Vec<Transaction> {
        let state = self.shared.state.lock();
        state.mempool.transactions().to_vec()
    }

    pub fn peers(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        state.peers.iter().cloned().collect()
    }

    pub fn info(&self) -> NodeInfoResponse {
        let state = self.shared.state.lock();
        NodeInfoResponse {
            name: env!("CARGO_PKG_NAME").to_string(),
            url: self.shared.config.url.clone(),
            height: state.tree.canonical_height(),
            difficulty: self.shared.config.difficulty,
            mining: Self::mining_status_str(self.mining_enabled()),
            peers: state.peers.iter().cloned().collect(),
            mempool: state.mempool.len(),
        }
    }
}
