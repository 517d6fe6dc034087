use clap::Parser;
use minicoin::api::build_router;
use minicoin::config::{Cli, NodeConfig};
use minicoin::network::HttpPeerSender;
use minicoin::Node;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minicoin=info".into()),
        )
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let config = NodeConfig::from(Cli::parse());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let initial_peers = config.peers.clone();

    info!(
        url = %config.url,
        difficulty = config.difficulty,
        mining = config.mining,
        "starting node"
    );

    let node = Node::new(config, Arc::new(HttpPeerSender::new()));
    node.start();

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            // The listening port is the node's identity; nothing to do
            // without it.
            error!(%addr, %err, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, "listening");

    // Register with the seed peers (and catch up on their chains) once the
    // listener is up, so they can reach us back immediately.
    {
        let node = node.clone();
        tokio::spawn(async move {
            for peer in initial_peers {
                node.register_with_peer(&peer).await;
            }
        });
    }

    let app = build_router(node.clone());
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
        node.stop_mining();
    };
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(%err, "server error");
        std::process::exit(1);
    }
}
