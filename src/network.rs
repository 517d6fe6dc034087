//! Wire messages and the outbound peer transport.
//!
//! Nodes speak JSON over HTTP. All outbound calls go through the
//! [`PeerSender`] trait so tests can stand in an in-process double for the
//! whole peer set; the production implementation is a thin `reqwest`
//! client.

use crate::error::{NodeError, Result};
use crate::types::{Block, Difficulty, Hash};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Peer registration and deregistration both accept one or many URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerListRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
}

impl PeerListRequest {
    pub fn single(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), urls: None }
    }

    /// Flatten `url` and `urls` into one list, dropping empties.
    pub fn all_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        if let Some(url) = &self.url {
            urls.push(url.clone());
        }
        if let Some(more) = &self.urls {
            urls.extend(more.iter().cloned());
        }
        urls.retain(|u| !u.is_empty());
        urls
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub ok: bool,
    /// The URLs the responder just learned.
    pub urls: Vec<String>,
    /// The responder's own URL.
    pub responder: String,
    /// The responder's current peer list, for the registrant to merge.
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub ok: bool,
    pub pong: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeersResponse {
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResponse {
    pub chain: Vec<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    pub ok: bool,
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestResponse {
    pub latest: Block,
    pub height: u64,
    pub difficulty: Difficulty,
}

/// A gossiped block with its loop-prevention trail. Every forwarder
/// appends its own URL to `previous_peers` before rebroadcast; a node that
/// finds itself in the trail does not forward again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPush {
    pub block: Block,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default)]
    pub previous_peers: Vec<String>,
}

/// Wire outcome of a block push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPushResponse {
    pub status: PushStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStatus {
    Accepted,
    /// Already known, or the trail shows this node has seen it.
    Ignored,
    /// Parent unknown; the sender may trigger a full sync.
    Gap,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxPushResponse {
    pub ok: bool,
    pub tx_id: Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningControlResponse {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningStatusResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfoResponse {
    pub name: String,
    pub url: String,
    pub height: u64,
    pub difficulty: Difficulty,
    pub mining: String,
    pub peers: Vec<String>,
    pub mempool: usize,
}

/// Outbound calls a node makes toward one peer.
#[async_trait]
pub trait PeerSender: Send + Sync {
    async fn register(
        &self,
        peer: &str,
        request: &PeerListRequest,
    ) -> Result<RegisterResponse>;

    async fn deregister(&self, peer: &str, request: &PeerListRequest) -> Result<()>;

    async fn ping(&self, peer: &str, from: &str) -> Result<PingResponse>;

    async fn push_block(&self, peer: &str, push: &BlockPush)
        -> Result<BlockPushResponse>;

    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>>;

    /// Point lookup used by orphan resolution; `Ok(None)` means the peer
    /// does not know the hash.
    async fn fetch_block(&self, peer: &str, hash: &str) -> Result<Option<Block>>;
}

/// `reqwest`-backed transport. No retries and no removal on failure; the
/// caller logs and moves on.
pub struct HttpPeerSender {
    client: reqwest::Client,
}

impl HttpPeerSender {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpPeerSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerSender for HttpPeerSender {
    async fn register(
        &self,
        peer: &str,
        request: &PeerListRequest,
    ) -> Result<RegisterResponse> {
        let response = self
            .client
            .post(format!("{peer}/peers/register"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    async fn deregister(&self, peer: &str, request: &PeerListRequest) -> Result<()> {
        self.client
            .post(format!("{peer}/peers/deregister"))
            .json(request)
            .send()
            .await?;
        Ok(())
    }

    async fn ping(&self, peer: &str, from: &str) -> Result<PingResponse> {
        let response = self
            .client
            .post(format!("{peer}/ping"))
            .json(&PingRequest { from: Some(from.to_string()) })
            .send()
            .await?;
        decode(response).await
    }

    async fn push_block(
        &self,
        peer: &str,
        push: &BlockPush,
    ) -> Result<BlockPushResponse> {
        let response = self
            .client
            .post(format!("{peer}/blocks"))
            .json(push)
            .send()
            .await?;
        decode(response).await
    }

    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>> {
        let response = self.client.get(format!("{peer}/chain")).send().await?;
        let body: ChainResponse = decode(response).await?;
        Ok(body.chain)
    }

    async fn fetch_block(&self, peer: &str, hash: &str) -> Result<Option<Block>> {
        let response = self
            .client
            .get(format!("{peer}/blocks/{hash}"))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(NodeError::Transport(format!(
                "block fetch from {peer} returned {}",
                response.status()
            )));
        }
        let body: BlockResponse = decode(response).await?;
        Ok(Some(body.block))
    }
}

/// Decode a peer response body, separating transport faults from peers
/// that answer with something unparseable.
async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    response
        .json()
        .await
        .map_err(|err| NodeError::MalformedPayload(err.to_string()))
}
