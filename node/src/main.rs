// node/src/main.rs

//! Node daemon binary.
//!
//! Usage: `node <name> <port> <publicUrl> [bootstrapPeerUrl]`
//!
//! Wires up the chain crate into a running node: disk-backed ledger, PEM
//! key pair, the full HTTP wire protocol, the epoch/gossip background
//! drivers, and a Prometheus metrics exporter. Exits 0 on Ctrl-C and
//! non-zero on any startup persistence failure.

mod driver;
mod routes;
mod state;

use std::sync::Arc;

use tokio::signal;
use tokio::sync::Mutex;

use chain::{
    ConsensusEngine, DiskStore, Keypair, Ledger, MeshClient, MetricsRegistry, NodeConfig,
    NodeContext, PeerRegistry, ReceiptEngine, TxPool, run_prometheus_http_server,
};

use state::{AppState, NodeState, SharedState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "node=info,chain=info".to_string()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("usage: {} <name> <port> <publicUrl> [bootstrapPeerUrl]", args[0]);
        std::process::exit(2);
    }
    let name = args[1].clone();
    let port: u16 = match args[2].parse() {
        Ok(p) => p,
        Err(_) => {
            eprintln!("invalid port: {}", args[2]);
            std::process::exit(2);
        }
    };
    let public_url = args[3].clone();
    let bootstrap = args.get(4).cloned();

    if let Err(e) = run(name, port, public_url, bootstrap).await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(
    name: String,
    port: u16,
    public_url: String,
    bootstrap: Option<String>,
) -> Result<(), String> {
    let cfg = NodeConfig::for_node(&name, port);

    // ---------------------------
    // Identity + storage
    // ---------------------------

    let keypair = Keypair::load_or_generate(&cfg.data_dir)
        .map_err(|e| format!("failed to load key pair from {}: {e}", cfg.data_dir.display()))?;

    let store = DiskStore::open(&cfg.data_dir)
        .map_err(|e| format!("failed to open data dir {}: {e}", cfg.data_dir.display()))?;
    let ledger =
        Ledger::open(store).map_err(|e| format!("failed to load the committed chain: {e}"))?;

    let ctx = NodeContext::new(name, public_url, keypair, cfg.clone());
    tracing::info!(
        name = %ctx.name,
        address = %ctx.address,
        url = %ctx.public_url,
        chain_length = ledger.len(),
        "node identity loaded"
    );

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::warn!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{addr}/metrics");
    }

    // ---------------------------
    // Shared state
    // ---------------------------

    let client = MeshClient::new(
        cfg.mesh.transport_timeout(),
        std::time::Duration::from_secs(cfg.receipts.challenge_timeout_secs),
    );

    let node = NodeState {
        consensus: ConsensusEngine::new(cfg.consensus.clone()),
        receipts: ReceiptEngine::new(cfg.receipts.clone()),
        registry: PeerRegistry::new(),
        tx_pool: TxPool::new(),
        ledger,
        ctx,
    };

    let app_state: SharedState = Arc::new(AppState {
        node: Mutex::new(node),
        metrics: metrics.clone(),
        client,
    });

    // ---------------------------
    // Bootstrap + background drivers
    // ---------------------------

    if let Some(bootstrap_url) = bootstrap {
        driver::bootstrap(&app_state, &bootstrap_url).await;
    }

    tokio::spawn(driver::run_epoch_loop(app_state.clone()));
    tokio::spawn(driver::run_gossip_loop(app_state.clone()));

    // ---------------------------
    // Protocol listener
    // ---------------------------

    let app = routes::router(app_state);
    let listen_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| format!("failed to bind {listen_addr}: {e}"))?;
    tracing::info!("node listening on http://{listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("protocol server error: {e}"))?;

    Ok(())
}

/// Waits for Ctrl-C, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
