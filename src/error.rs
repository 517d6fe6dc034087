//! Error types for the node.
//!
//! Consensus verdicts are data (`ValidationResult`, mempool verdicts,
//! ingest outcomes); `NodeError` is reserved for real faults.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("peer transport failed: {0}")]
    Transport(String),

    #[error("peer returned malformed payload: {0}")]
    MalformedPayload(String),

    #[error("remote chain rejected: {0}")]
    ChainRejected(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for NodeError {
    fn from(err: reqwest::Error) -> Self {
        NodeError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
