//! The block tree: every validated block keyed by hash, cumulative
//! difficulty per node, the canonical tip, and the orphan index for blocks
//! whose parent has not arrived yet.
//!
//! Blocks are never mutated or removed; a detached branch stays in the tree
//! because it may become canonical later.

use crate::block::genesis_block;
use crate::types::{Block, CumulativeDifficulty, Hash};
use std::collections::HashMap;

/// A stored block plus the fork-choice metric of the branch ending at it.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub block: Block,
    pub cumulative_difficulty: CumulativeDifficulty,
}

#[derive(Debug)]
pub struct BlockTree {
    nodes: HashMap<Hash, TreeNode>,
    /// missing parent hash → blocks waiting for it, in arrival order.
    orphans: HashMap<Hash, Vec<Block>>,
    canonical_tip: Hash,
    genesis_hash: Hash,
}

impl BlockTree {
    /// A fresh tree holds exactly the hardcoded genesis, which starts as
    /// the canonical tip.
    pub fn new() -> Self {
        let genesis = genesis_block();
        let genesis_hash = genesis.hash.clone();
        let mut nodes = HashMap::new();
        nodes.insert(
            genesis_hash.clone(),
            TreeNode { block: genesis, cumulative_difficulty: 0 },
        );
        Self {
            nodes,
            orphans: HashMap::new(),
            canonical_tip: genesis_hash.clone(),
            genesis_hash,
        }
    }

    /// Rebuild a tree from a linear chain, discarding any previous side
    /// branches. The chain must begin with genesis and be parent-linked;
    /// the caller has validated it.
    pub fn from_linear_chain(chain: Vec<Block>) -> Self {
        let mut tree = Self::new();
        let tip = chain.last().map(|b| b.hash.clone());
        for block in chain.into_iter().skip(1) {
            tree.insert_child(block);
        }
        if let Some(tip) = tip {
            if tree.nodes.contains_key(&tip) {
                tree.canonical_tip = tip;
            }
        }
        tree
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&TreeNode> {
        self.nodes.get(hash)
    }

    pub fn genesis_hash(&self) -> &Hash {
        &self.genesis_hash
    }

    pub fn canonical_tip(&self) -> &TreeNode {
        // The tip hash always names a stored node; genesis is inserted at
        // construction and nodes are never removed.
        self.nodes
            .get(&self.canonical_tip)
            .unwrap_or_else(|| unreachable!("canonical tip missing from tree"))
    }

    pub fn set_canonical_tip(&mut self, hash: Hash) {
        debug_assert!(self.nodes.contains_key(&hash));
        self.canonical_tip = hash;
    }

    /// Insert a block whose parent is already stored. Cumulative difficulty
    /// extends the parent's.
    pub fn insert_child(&mut self, block: Block) {
        let parent_difficulty = self
            .nodes
            .get(&block.prev_hash)
            .map(|n| n.cumulative_difficulty)
            .unwrap_or(0);
        let node = TreeNode {
            cumulative_difficulty: parent_difficulty
                + CumulativeDifficulty::from(block.difficulty),
            block,
        };
        self.nodes.insert(node.block.hash.clone(), node);
    }

    /// Park a block whose parent is unknown. Duplicate orphans (same hash)
    /// are dropped.
    pub fn add_orphan(&mut self, block: Block) {
        let waiting = self.orphans.entry(block.prev_hash.clone()).or_default();
        if waiting.iter().any(|b| b.hash == block.hash) {
            return;
        }
        waiting.push(block);
    }

    /// Remove and return every orphan that was waiting for `parent_hash`.
    /// The index entry is deleted only here, when consumed.
    pub fn take_orphans_of(&mut self, parent_hash: &str) -> Vec<Block> {
        self.orphans.remove(parent_hash).unwrap_or_default()
    }

    pub fn is_orphaned(&self, hash: &str) -> bool {
        self.orphans.values().flatten().any(|b| b.hash == hash)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.values().map(|v| v.len()).sum()
    }

    /// Walk parent pointers from `tip_hash` down to the root and return the
    /// chain in genesis-first order. `None` if the walk breaks or does not
    /// end at the hardcoded genesis.
    pub fn chain_to(&self, tip_hash: &str) -> Option<Vec<&Block>> {
        let mut chain = Vec::new();
        let mut cursor = self.nodes.get(tip_hash)?;
        loop {
            chain.push(&cursor.block);
            if cursor.block.height == 0 {
                break;
            }
            cursor = self.nodes.get(&cursor.block.prev_hash)?;
        }
        if chain.last().map(|b| &b.hash) != Some(&self.genesis_hash) {
            return None;
        }
        chain.reverse();
        Some(chain)
    }

    /// The canonical chain, genesis first.
    pub fn canonical_chain(&self) -> Vec<&Block> {
        self.chain_to(&self.canonical_tip)
            .unwrap_or_else(|| unreachable!("canonical tip not rooted at genesis"))
    }

    pub fn canonical_height(&self) -> u64 {
        self.canonical_tip().block.height
    }

    /// Greatest cumulative difficulty among all stored nodes, for
    /// diagnostics; fork-choice itself compares candidate tips directly.
    pub fn best_cumulative_difficulty(&self) -> CumulativeDifficulty {
        self.nodes
            .values()
            .map(|n| n.cumulative_difficulty)
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for BlockTree {
    fn default() -> Self {
        Self::new()
    }
}
