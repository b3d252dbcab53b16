//! `POST /transaction`: transaction ingress.

use axum::{Json, extract::State, http::StatusCode};

use chain::{OkResponse, Transaction};

use crate::state::SharedState;

/// Verifies, pools, and relays a transaction.
///
/// Ingress is idempotent on the transaction's dedup key: a resubmission
/// of something already pending or already committed acknowledges
/// without re-queueing. Fresh transactions are relayed to every known
/// peer; the dedup key stops relay loops.
pub async fn submit(
    State(state): State<SharedState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<OkResponse>, (StatusCode, String)> {
    let relay_targets = {
        let mut node = state.node.lock().await;
        if !tx.verify_signature() {
            return Err((
                StatusCode::BAD_REQUEST,
                "transaction signature invalid".to_string(),
            ));
        }

        let key = tx.dedup_key();
        if node.ledger.has_committed_tx(&key) || !node.tx_pool.submit(tx.clone()) {
            None
        } else {
            tracing::debug!(from = %tx.from, to = %tx.to, amount = tx.amount, "transaction pooled");
            Some(
                node.registry
                    .iter()
                    .map(|(_, r)| r.url.clone())
                    .collect::<Vec<_>>(),
            )
        }
    };

    if let Some(urls) = relay_targets {
        for url in urls {
            if let Err(e) = state.client.submit_transaction(&url, &tx).await {
                tracing::debug!("transaction relay to {url} failed: {e}");
            }
        }
    }
    Ok(Json(OkResponse::OK))
}
