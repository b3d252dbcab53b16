//! Peer lifecycle endpoints: `POST /announce` and `GET /peers`.

use axum::{Json, extract::State, http::StatusCode};

use chain::{AnnounceRequest, OkResponse, PeerInfo};

use crate::state::{SharedState, now_ms};

/// `POST /announce`
///
/// Registers the sender in the peer map. The PEM key is authoritative;
/// inconsistent key material is a client error.
pub async fn announce(
    State(state): State<SharedState>,
    Json(req): Json<AnnounceRequest>,
) -> Result<Json<OkResponse>, (StatusCode, String)> {
    let mut node = state.node.lock().await;
    if req.public_key_hash == node.ctx.public_key_hash {
        // Our own announcement reflected back; nothing to record.
        return Ok(Json(OkResponse::OK));
    }
    let addr = node
        .registry
        .register(
            &req.id,
            &req.url,
            &req.public_key_pem,
            &req.public_key_hash,
            now_ms(),
        )
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    tracing::info!(peer = %addr, id = %req.id, url = %req.url, "peer announced");
    Ok(Json(OkResponse::OK))
}

/// `GET /peers`
///
/// The mesh as this node sees it, including itself.
pub async fn list(State(state): State<SharedState>) -> Json<Vec<PeerInfo>> {
    let node = state.node.lock().await;
    let mut peers = vec![PeerInfo {
        id: node.ctx.name.clone(),
        url: node.ctx.public_url.clone(),
        public_key_hash: node.ctx.public_key_hash.clone(),
    }];
    peers.extend(node.registry.iter().map(|(_, r)| PeerInfo {
        id: r.id.clone(),
        url: r.url.clone(),
        public_key_hash: r.public_key_hash.clone(),
    }));
    Json(peers)
}
