//! `POST /gossip`: liveness beacon and peer list exchange.

use axum::{Json, extract::State};

use chain::{GossipMessage, OkResponse};

use crate::state::{SharedState, now_ms};

/// Folds the sender's peer list into our registry and records the chain
/// tip it reported. Chain adoption itself happens on the outbound side
/// of the gossip loop.
pub async fn gossip(
    State(state): State<SharedState>,
    Json(msg): Json<GossipMessage>,
) -> Json<OkResponse> {
    let mut node = state.node.lock().await;
    let now = now_ms();
    let self_hash = node.ctx.public_key_hash.clone();

    for peer in &msg.peers {
        if peer.public_key_hash == self_hash {
            continue;
        }
        if let Err(e) = node.registry.register(
            &peer.id,
            &peer.url,
            &peer.public_key_pem,
            &peer.public_key_hash,
            now,
        ) {
            tracing::debug!(id = %peer.id, "gossiped peer rejected: {e}");
        }
    }
    node.registry
        .note_gossip(&msg.from, msg.chain_length, msg.last_block_hash, now);
    Json(OkResponse::OK)
}
