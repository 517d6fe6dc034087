//! Node configuration and command-line parsing.

use crate::constants::{BLOCK_TX_CAP, MAX_DIFFICULTY, MINER_DEBOUNCE_MS};
use clap::Parser;

/// Runtime parameters of one node. Difficulty is fixed for the lifetime of
/// the network: every peer must run the same value.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port the HTTP listener binds.
    pub port: u16,
    /// URL this node advertises to peers.
    pub url: String,
    /// Leading zero hex digits required of block hashes.
    pub difficulty: u32,
    /// Address credited by this node's coinbases.
    pub miner_address: String,
    /// Free-form tag stamped into mined block data.
    pub miner_tag: String,
    /// Whether the miner starts enabled.
    pub mining: bool,
    /// Peers contacted at startup.
    pub peers: Vec<String>,
    /// Mempool transactions appended after the coinbase when assembling.
    pub block_tx_cap: usize,
    /// Miner restart debounce window.
    pub debounce_ms: u64,
}

impl NodeConfig {
    /// Reasonable defaults for tests and local experiments.
    pub fn for_tests(difficulty: u32, miner_address: impl Into<String>) -> Self {
        Self {
            port: 0,
            url: "http://localhost:0".into(),
            difficulty,
            miner_address: miner_address.into(),
            miner_tag: "test-node".into(),
            mining: false,
            peers: vec![],
            block_tx_cap: BLOCK_TX_CAP,
            debounce_ms: MINER_DEBOUNCE_MS,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "minicoin", about = "Educational UTXO proof-of-work node")]
pub struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// URL advertised to peers; defaults to http://localhost:<port>.
    #[arg(long)]
    pub url: Option<String>,

    /// Network difficulty: leading zero hex digits required of block hashes.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(0..=MAX_DIFFICULTY as i64))]
    pub difficulty: u32,

    /// Address credited by this node's coinbases.
    #[arg(long, default_value = "")]
    pub miner_address: String,

    /// Tag stamped into mined blocks.
    #[arg(long, default_value = "")]
    pub miner_tag: String,

    /// Start with the miner enabled.
    #[arg(long, default_value_t = false)]
    pub mine: bool,

    /// Peer URLs to register with at startup; repeatable.
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// Mempool transactions per assembled block, after the coinbase.
    #[arg(long, default_value_t = BLOCK_TX_CAP)]
    pub block_tx_cap: usize,

    /// Miner restart debounce in milliseconds.
    #[arg(long, default_value_t = MINER_DEBOUNCE_MS)]
    pub debounce_ms: u64,
}

impl From<Cli> for NodeConfig {
    fn from(cli: Cli) -> Self {
        let url = cli
            .url
            .unwrap_or_else(|| format!("http://localhost:{}", cli.port));
        let miner_tag = if cli.miner_tag.is_empty() {
            url.clone()
        } else {
            cli.miner_tag
        };
        NodeConfig {
            port: cli.port,
            url,
            difficulty: cli.difficulty,
            miner_address: cli.miner_address,
            miner_tag,
            mining: cli.mine,
            peers: cli.peers,
            block_tx_cap: cli.block_tx_cap,
            debounce_ms: cli.debounce_ms,
        }
    }
}
