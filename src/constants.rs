//! Protocol constants shared by every node.

/// Amount minted by the coinbase of every non-genesis block.
pub const COINBASE_REWARD: u64 = 100;

/// Maximum number of mempool transactions appended after the coinbase when
/// assembling a candidate block.
pub const BLOCK_TX_CAP: usize = 2;

/// Quiet window between a restart trigger and the actual miner restart.
pub const MINER_DEBOUNCE_MS: u64 = 250;

/// Delay before respawning the mining engine after a worker fault.
pub const MINER_RESPAWN_DELAY_MS: u64 = 1_000;

/// How far ahead of local wall-clock time a block timestamp may run.
pub const MAX_FUTURE_DRIFT_MS: u64 = 60_000;

/// Difficulty counts leading zero hex digits of the header hash, so it is
/// bounded by the digest length.
pub const MAX_DIFFICULTY: u32 = 64;

/// The mining engine checks the shared cancel word once per this many nonce
/// attempts. A single header hash costs about a microsecond, so
/// cancellation is observed within a few milliseconds at any difficulty,
/// well inside the restart debounce window.
pub const CANCEL_POLL_STRIDE: u64 = 4_096;

/// Genesis parent pointer: 64 zero hex digits.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Genesis timestamp, fixed so every node derives the identical block.
pub const GENESIS_TIMESTAMP: u64 = 0;
