//! HTTP boundary: thin adapters from requests to core node operations.
//!
//! Handlers translate JSON in, call one node method, and translate JSON
//! out; no consensus logic lives here.

use crate::network::{
    BalanceResponse, BlockPush, BlockResponse, ChainResponse, LatestResponse,
    MiningControlResponse, MiningStatusResponse, PeerListRequest, PeersResponse,
    PingRequest, PingResponse, PushStatus, TxPushResponse,
};
use crate::node::Node;
use crate::types::Transaction;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Json<Self> {
        Json(Self { ok: false, error: error.into() })
    }
}

pub fn build_router(node: Node) -> Router {
    Router::new()
        .route("/", get(node_info))
        .route("/peers/register", post(register_peers))
        .route("/peers/deregister", post(deregister_peers))
        .route("/peers", get(list_peers))
        .route("/ping", post(ping))
        .route("/chain", get(full_chain))
        .route("/blocks", post(push_block))
        .route("/blocks/latest", get(latest_block))
        .route("/blocks/:hash", get(block_by_hash))
        .route("/transactions", post(push_transaction).get(list_transactions))
        .route("/unspent/:address", get(unspent))
        .route("/balance/:address", get(balance))
        .route("/mining", get(mining_status))
        .route("/mining/start", post(start_mining))
        .route("/mining/stop", post(stop_mining))
        .route("/mining/restart", post(restart_mining))
        .with_state(node)
}

async fn node_info(State(node): State<Node>) -> impl IntoResponse {
    Json(node.info())
}

async fn register_peers(
    State(node): State<Node>,
    Json(request): Json<PeerListRequest>,
) -> impl IntoResponse {
    Json(node.handle_register(&request))
}

async fn deregister_peers(
    State(node): State<Node>,
    Json(request): Json<PeerListRequest>,
) -> impl IntoResponse {
    Json(node.handle_deregister(&request))
}

async fn list_peers(State(node): State<Node>) -> impl IntoResponse {
    Json(PeersResponse { peers: node.peers() })
}

async fn ping(
    State(_node): State<Node>,
    request: Option<Json<PingRequest>>,
) -> impl IntoResponse {
    if let Some(Json(PingRequest { from: Some(from) })) = request {
        debug!(%from, "pinged");
    }
    Json(PingResponse { ok: true, pong: true })
}

async fn full_chain(State(node): State<Node>) -> impl IntoResponse {
    Json(ChainResponse { chain: node.canonical_chain() })
}

async fn latest_block(State(node): State<Node>) -> impl IntoResponse {
    let latest = node.latest_block();
    Json(LatestResponse {
        height: latest.height,
        difficulty: node.config().difficulty,
        latest,
    })
}

async fn block_by_hash(
    State(node): State<Node>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    match node.block_by_hash(&hash) {
        Some(block) => {
            (StatusCode::OK, Json(BlockResponse { ok: true, block })).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new(format!("unknown block {hash}")),
        )
            .into_response(),
    }
}

async fn push_block(
    State(node): State<Node>,
    Json(push): Json<BlockPush>,
) -> impl IntoResponse {
    let response = node.handle_block_push(push).await;
    let status = match response.status {
        PushStatus::Invalid => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    (status, Json(response))
}

async fn push_transaction(
    State(node): State<Node>,
    Json(tx): Json<Transaction>,
) -> impl IntoResponse {
    match node.submit_transaction(tx) {
        Ok(tx_id) => {
            (StatusCode::OK, Json(TxPushResponse { ok: true, tx_id })).into_response()
        }
        Err(reason) => {
            (StatusCode::BAD_REQUEST, ErrorResponse::new(reason)).into_response()
        }
    }
}

async fn list_transactions(State(node): State<Node>) -> impl IntoResponse {
    Json(node.pooled_transactions())
}

async fn unspent(
    State(node): State<Node>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    Json(node.unspent(&address))
}

async fn balance(
    State(node): State<Node>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    Json(BalanceResponse { balance: node.balance(&address), address })
}

async fn mining_status(State(node): State<Node>) -> impl IntoResponse {
    Json(MiningStatusResponse { status: node.mining_status() })
}

async fn start_mining(State(node): State<Node>) -> impl IntoResponse {
    let (old, new) = node.start_mining();
    Json(MiningControlResponse { old, new })
}

async fn stop_mining(State(node): State<Node>) -> impl IntoResponse {
    let (old, new) = node.stop_mining();
    Json(MiningControlResponse { old, new })
}

async fn restart_mining(State(node): State<Node>) -> impl IntoResponse {
    let (old, new) = node.restart_mining();
    Json(MiningControlResponse { old, new })
}
