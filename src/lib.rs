//! # minicoin
//!
//! An educational peer-to-peer cryptocurrency node: a UTXO blockchain
//! secured by proof-of-work, with HTTP gossip between nodes and a
//! background miner.
//!
//! ## Architecture
//!
//! The consensus core is built from pure, state-passing functions:
//! validators return verdicts as data, `connect_block` maps a UTXO set to
//! the next one or leaves it untouched, and chain replay rebuilds state
//! from the hardcoded genesis. The [`node::Node`] owns all mutable state
//! behind a single lock and drives ingest, fork-choice with
//! reorganization, mempool repair, gossip, and the miner around that core.
//!
//! ## Design principles
//!
//! 1. **Verdicts, not panics**: peer-supplied data flows through total
//!    functions returning tagged results; the ingest path never throws.
//! 2. **One transactional boundary**: every handler computes its full
//!    state transition inside one lock acquisition, never across an await.
//! 3. **One ingress path**: locally mined blocks enter exactly like blocks
//!    from the wire, so acceptance logic exists once.
//! 4. **Message passing to the miner**: the engine shares nothing with the
//!    node but the candidate it was handed and one atomic cancel word.

pub mod api;
pub mod block;
pub mod config;
pub mod constants;
pub mod error;
pub mod hashing;
pub mod mempool;
pub mod miner;
pub mod mining;
pub mod network;
pub mod node;
pub mod reorganization;
pub mod transaction;
pub mod tree;
pub mod types;

pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use node::Node;
pub use types::*;
