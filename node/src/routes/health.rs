//! `GET /health`: node status summary.

use axum::{Json, extract::State};
use serde::Serialize;

use chain::Address;

use crate::state::SharedState;

/// Counters mirrored from the Prometheus registry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub view_changes: u64,
    pub slash_events: u64,
    pub blocks_produced: u64,
    pub blocks_committed: u64,
    pub challenges_sent: u64,
    pub challenges_received: u64,
    pub receipts_verified: u64,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub name: String,
    pub address: Address,
    pub epoch: u64,
    pub view: u64,
    pub chain_length: u64,
    pub peers: usize,
    pub effectiveness: f64,
    pub balance: u64,
    pub slashed_nodes_count: usize,
    pub stats: Stats,
}

/// Node status: identity, consensus position, ledger summary, and the
/// progress counters.
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let node = state.node.lock().await;
    let metrics = &state.metrics.consensus;
    let own = node.ledger.account_of(&node.ctx.address);

    Json(HealthResponse {
        name: node.ctx.name.clone(),
        address: node.ctx.address,
        epoch: node.consensus.epoch(),
        view: node.consensus.view(),
        chain_length: node.ledger.len() as u64,
        peers: node.registry.len(),
        effectiveness: node.receipts.effectiveness_of(&node.ctx.address),
        balance: own.balance,
        slashed_nodes_count: node.ledger.slashed_count(),
        stats: Stats {
            view_changes: metrics.view_changes.get(),
            slash_events: metrics.slash_events.get(),
            blocks_produced: metrics.blocks_produced.get(),
            blocks_committed: metrics.blocks_committed.get(),
            challenges_sent: metrics.challenges_sent.get(),
            challenges_received: metrics.challenges_received.get(),
            receipts_verified: metrics.receipts_verified.get(),
        },
    })
}
