//! `POST /challenge`: serve a participation challenge.

use axum::{Json, extract::State};

use chain::{ChallengeResponse, ReceiptEngine, types::Challenge};

use crate::state::{SharedState, now_ms};

/// Runs the fixed workload and returns a signed receipt together with
/// our public key so the challenger can verify it.
pub async fn challenge(
    State(state): State<SharedState>,
    Json(challenge): Json<Challenge>,
) -> Json<ChallengeResponse> {
    state.metrics.consensus.challenges_received.inc();
    let node = state.node.lock().await;
    let receipt = ReceiptEngine::respond(&challenge, &node.ctx.keypair, now_ms());
    Json(ChallengeResponse {
        receipt,
        public_key_pem: node.ctx.public_key_pem.clone(),
    })
}
