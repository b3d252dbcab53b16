//! HTTP wire protocol.
//!
//! One handler module per endpoint group; bodies are the JSON records
//! from `chain::mesh::messages`. Responses are JSON with permissive CORS
//! so browser-side wallets can talk to any node directly.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::state::SharedState;

pub mod challenge;
pub mod consensus;
pub mod gossip;
pub mod health;
pub mod peers;
pub mod query;
pub mod transactions;

/// Builds the protocol router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/announce", post(peers::announce))
        .route("/peers", get(peers::list))
        .route("/challenge", post(challenge::challenge))
        .route("/propose", post(consensus::propose))
        .route("/vote", post(consensus::vote))
        .route("/commit", post(consensus::commit))
        .route("/view-change", post(consensus::view_change))
        .route("/transaction", post(transactions::submit))
        .route("/chain", get(query::chain))
        .route("/headers", get(query::headers))
        .route("/proof/{txHash}", get(query::proof))
        .route("/balance/{address}", get(query::balance))
        .route("/gossip", post(gossip::gossip))
        .route("/health", get(health::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
