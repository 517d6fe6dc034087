//! HTTP boundary tests: each route is a thin adapter, so these drive the
//! router directly with `tower::ServiceExt::oneshot` and check wire shapes
//! and status codes.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{mine_child, push_to, InProcessNetwork, Wallet};
use minicoin::api::build_router;
use minicoin::network::{
    BalanceResponse, BlockPushResponse, ChainResponse, LatestResponse,
    MiningControlResponse, NodeInfoResponse, PeersResponse, PingResponse,
    PushStatus, RegisterResponse,
};
use minicoin::{Node, NodeConfig};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

fn test_node(miner: &Wallet) -> Node {
    let network = InProcessNetwork::new();
    let config = NodeConfig::for_tests(1, miner.address.clone());
    Node::new(config, network as Arc<dyn minicoin::network::PeerSender>)
}

async fn get_json<T: DeserializeOwned>(node: &Node, uri: &str) -> (StatusCode, T) {
    let response = build_router(node.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_json<T: DeserializeOwned>(
    node: &Node,
    uri: &str,
    body: &str,
) -> (StatusCode, T) {
    let response = build_router(node.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn info_reports_fresh_node() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);
    let (status, info): (_, NodeInfoResponse) = get_json(&node, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info.height, 0);
    assert_eq!(info.difficulty, 1);
    assert_eq!(info.mining, "stopped");
    assert_eq!(info.mempool, 0);
}

#[tokio::test]
async fn latest_block_is_genesis_at_start() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);
    let (status, latest): (_, LatestResponse) = get_json(&node, "/blocks/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest.height, 0);
    assert_eq!(latest.latest.prev_hash, "0".repeat(64));
    assert_eq!(latest.difficulty, 1);
}

#[tokio::test]
async fn chain_grows_after_accepted_block() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);
    let block = mine_child(&node.latest_block(), vec![], &miner.address, 1);
    push_to(&node, block.clone(), None).await;

    let (_, chain): (_, ChainResponse) = get_json(&node, "/chain").await;
    assert_eq!(chain.chain.len(), 2);
    assert_eq!(chain.chain[1].hash, block.hash);
}

#[tokio::test]
async fn block_lookup_hits_and_misses() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);
    let genesis_hash = node.latest_block().hash;

    let (status, _): (_, serde_json::Value) =
        get_json(&node, &format!("/blocks/{genesis_hash}")).await;
    assert_eq!(status, StatusCode::OK);

    let missing = "f".repeat(64);
    let (status, _): (_, serde_json::Value) =
        get_json(&node, &format!("/blocks/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn block_push_reports_invalid_with_reason() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);
    let mut block = mine_child(&node.latest_block(), vec![], &miner.address, 1);
    block.nonce += 1;

    let body = serde_json::json!({ "block": block }).to_string();
    let (status, response): (_, BlockPushResponse) =
        post_json(&node, "/blocks", &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response.status, PushStatus::Invalid);
    assert!(response.reason.is_some());
}

#[tokio::test]
async fn malformed_transaction_is_a_client_error() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);
    let response = build_router(node.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/transactions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"id": 7}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert!(node.pooled_transactions().is_empty());
}

#[tokio::test]
async fn transaction_submission_round_trips() {
    let alice = Wallet::from_seed(1);
    let bob = Wallet::from_seed(2);
    let node = test_node(&alice);
    let block = mine_child(&node.latest_block(), vec![], &alice.address, 1);
    push_to(&node, block, None).await;

    let tx = alice.transfer(&node.unspent(&alice.address), &bob.address, 25);
    let body = serde_json::to_string(&tx).unwrap();
    let (status, value): (_, serde_json::Value) =
        post_json(&node, "/transactions", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["ok"], true);
    assert_eq!(value["txId"], tx.id.as_str());

    let (_, unspent): (_, Vec<minicoin::types::Utxo>) =
        get_json(&node, &format!("/unspent/{}", alice.address)).await;
    assert!(unspent.is_empty(), "pending inputs must be filtered out");
}

#[tokio::test]
async fn balance_sums_filtered_utxos() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);
    let block = mine_child(&node.latest_block(), vec![], &miner.address, 1);
    push_to(&node, block, None).await;

    let (status, balance): (_, BalanceResponse) =
        get_json(&node, &format!("/balance/{}", miner.address)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance.address, miner.address);
    assert_eq!(balance.balance, 100);
}

#[tokio::test]
async fn peer_registration_and_listing() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);
    let (status, response): (_, RegisterResponse) = post_json(
        &node,
        "/peers/register",
        r#"{"urls": ["http://a:1", "http://b:2"]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.ok);
    assert_eq!(response.urls.len(), 2);
    assert_eq!(response.peers.len(), 2);

    let (_, peers): (_, PeersResponse) = get_json(&node, "/peers").await;
    assert_eq!(peers.peers, vec!["http://a:1", "http://b:2"]);

    let (_, after): (_, RegisterResponse) =
        post_json(&node, "/peers/deregister", r#"{"url": "http://a:1"}"#).await;
    assert_eq!(after.peers, vec!["http://b:2"]);
}

#[tokio::test]
async fn ping_answers_pong() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);
    let (status, pong): (_, PingResponse) =
        post_json(&node, "/ping", r#"{"from": "http://a:1"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert!(pong.ok);
    assert!(pong.pong);
}

#[tokio::test]
async fn mining_control_reports_transitions() {
    let miner = Wallet::from_seed(1);
    let node = test_node(&miner);

    let (_, started): (_, MiningControlResponse) =
        post_json(&node, "/mining/start", "{}").await;
    assert_eq!(started.old, "stopped");
    assert_eq!(started.new, "running");

    let (_, status): (_, serde_json::Value) = get_json(&node, "/mining").await;
    assert_eq!(status["status"], "running");

    let (_, stopped): (_, MiningControlResponse) =
        post_json(&node, "/mining/stop", "{}").await;
    assert_eq!(stopped.old, "running");
    assert_eq!(stopped.new, "stopped");
}
