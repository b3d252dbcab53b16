//! Read-only chain queries: `GET /chain`, `/headers`, `/proof/{txHash}`,
//! and `/balance/{address}`.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

use chain::merkle::ProofStep;
use chain::{Block, BlockHeader, Hash256};

use crate::state::SharedState;

/// Blocks served per `GET /chain` / `GET /headers` call.
const CHAIN_PAGE: usize = 100;

/// `GET /chain`: the most recent blocks, oldest first.
pub async fn chain(State(state): State<SharedState>) -> Json<Vec<Block>> {
    let node = state.node.lock().await;
    Json(node.ledger.tail(CHAIN_PAGE))
}

/// `GET /headers`: the most recent headers, oldest first.
pub async fn headers(State(state): State<SharedState>) -> Json<Vec<BlockHeader>> {
    let node = state.node.lock().await;
    Json(node.ledger.headers(CHAIN_PAGE))
}

/// Response body for `GET /proof/{txHash}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_epoch: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<Hash256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_root: Option<Hash256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Vec<ProofStep>>,
}

/// `GET /proof/{txHash}`: SPV inclusion proof for a committed
/// transaction.
pub async fn proof(
    State(state): State<SharedState>,
    Path(tx_hash): Path<String>,
) -> Result<Json<ProofResponse>, (StatusCode, String)> {
    let tx_hash: Hash256 = tx_hash
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid transaction hash".to_string()))?;

    let node = state.node.lock().await;
    let response = match node.ledger.proof_for(&tx_hash) {
        Some(p) => ProofResponse {
            found: true,
            block_epoch: Some(p.block_epoch),
            block_hash: Some(p.block_hash),
            tx_root: Some(p.tx_root),
            proof: Some(p.proof),
        },
        None => ProofResponse {
            found: false,
            block_epoch: None,
            block_hash: None,
            tx_root: None,
            proof: None,
        },
    };
    Ok(Json(response))
}

/// Response body for `GET /balance/{address}`.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: u64,
    pub nonce: u64,
}

/// `GET /balance/{address}`: account state; unknown addresses read as
/// zero.
pub async fn balance(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, (StatusCode, String)> {
    let address: chain::Address = address
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid address".to_string()))?;

    let node = state.node.lock().await;
    let account = node.ledger.account_of(&address);
    Ok(Json(BalanceResponse {
        balance: account.balance,
        nonce: account.nonce,
    }))
}
