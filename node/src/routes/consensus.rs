//! Consensus endpoints: `POST /propose`, `/vote`, `/commit`, and
//! `/view-change`.
//!
//! Rejections travel in the response body, never as HTTP errors:
//! malformed or unverifiable messages are dropped silently per the error
//! policy, and only equivocation earns an actionable reply (the
//! evidence).

use std::time::Instant;

use axum::{Json, extract::State};

use chain::{
    Acceptance, Block, EpochState, LedgerError, OkResponse, ProposeResponse, ViewChangeMessage,
    VoteMessage, crypto, validate_committed, validate_proposal,
};

use crate::driver;
use crate::state::{NodeState, SharedState};

/// `POST /propose`
///
/// Full follower-side validation of a leader's proposal. Acceptance
/// returns our vote; equivocation returns evidence alongside the
/// rejection.
pub async fn propose(
    State(state): State<SharedState>,
    Json(block): Json<Block>,
) -> Json<ProposeResponse> {
    let started = Instant::now();
    let response = {
        let mut node = state.node.lock().await;
        handle_propose(&mut node, &state, block)
    };
    state
        .metrics
        .consensus
        .proposal_validation_seconds
        .observe(started.elapsed().as_secs_f64());
    Json(response)
}

fn handle_propose(node: &mut NodeState, state: &SharedState, block: Block) -> ProposeResponse {
    if !block.verify_leader_signature() {
        return ProposeResponse::rejected("leader signature invalid".to_string(), None);
    }

    if let Some(evidence) = node.consensus.observe_block(&block) {
        node.apply_evidence_slash(&evidence, &state.metrics);
        return ProposeResponse::rejected(
            format!(
                "equivocation by {} at epoch {}",
                evidence.leader(),
                evidence.epoch()
            ),
            Some(evidence),
        );
    }

    let head = node.ledger.head();
    let validators = node.validator_set();
    // A proposal for our current epoch is judged at our current view;
    // anything else (catch-up traffic) at the initial view.
    let view = if node.consensus.epoch() == block.epoch {
        node.consensus.view()
    } else {
        0
    };

    match validate_proposal(&block, head, &node.ledger, &validators, view) {
        Ok(acceptance) => {
            if acceptance == Acceptance::CatchUp {
                tracing::warn!(
                    epoch = block.epoch,
                    "voting for proposal with unknown ancestor (catch-up)"
                );
            }
            let signature = node.ctx.keypair.sign(block.hash.as_bytes());
            let vote = VoteMessage {
                epoch: block.epoch,
                block_hash: block.hash,
                voter: node.ctx.address,
                voter_pub_key: node.ctx.public_key_b64.clone(),
                signature,
            };
            node.consensus.set_active(block);
            ProposeResponse::accepted(vote)
        }
        Err(e) => {
            tracing::debug!("proposal rejected: {e}");
            ProposeResponse::rejected(e.to_string(), None)
        }
    }
}

/// `POST /vote`
///
/// Out-of-band vote delivery. Invalid votes are dropped silently; a
/// quorum-completing vote triggers the leader commit path.
pub async fn vote(
    State(state): State<SharedState>,
    Json(vote): Json<VoteMessage>,
) -> Json<OkResponse> {
    let commit_epoch = {
        let mut node = state.node.lock().await;
        let Some(vk) = crypto::public_key_from_b64(&vote.voter_pub_key) else {
            return Json(OkResponse::OK);
        };
        match node
            .consensus
            .register_vote(vote.voter, vote.block_hash, vote.signature, &vk)
        {
            Ok(count) => {
                let quorum = node.consensus.quorum(node.validator_set().len());
                let leading = node
                    .consensus
                    .active()
                    .is_some_and(|b| b.leader == node.ctx.address);
                (leading && count >= quorum).then(|| node.consensus.epoch())
            }
            Err(e) => {
                tracing::debug!("vote dropped: {e}");
                None
            }
        }
    };

    if let Some(epoch) = commit_epoch {
        driver::try_commit_as_leader(&state, epoch).await;
    }
    Json(OkResponse::OK)
}

/// `POST /commit`
///
/// Accepts a committed block after re-verifying the leader signature and
/// a quorum of valid votes.
pub async fn commit(State(state): State<SharedState>, Json(block): Json<Block>) -> Json<OkResponse> {
    let mut node = state.node.lock().await;

    if !block.verify_leader_signature() {
        return Json(OkResponse::OK); // silently dropped
    }
    if let Some(evidence) = node.consensus.observe_block(&block) {
        node.apply_evidence_slash(&evidence, &state.metrics);
        return Json(OkResponse::OK);
    }

    let quorum = node.consensus.quorum(node.validator_set().len());
    let verdict = {
        let resolve = |addr: &chain::Address| node.resolve_key(addr);
        validate_committed(&block, quorum, &resolve)
    };
    if let Err(e) = verdict {
        tracing::debug!(epoch = block.epoch, "committed block dropped: {e}");
        return Json(OkResponse::OK);
    }

    let (head_epoch, _) = node.ledger.head();
    if block.epoch == head_epoch + 1 {
        match node.commit_block(block, &state.metrics) {
            Ok(()) => {}
            Err(LedgerError::Storage(e)) => {
                tracing::error!("persistence failure on commit: {e}");
                std::process::exit(1);
            }
            Err(e) => tracing::warn!("commit dropped: {e}"),
        }
    } else if block.epoch > head_epoch + 1 {
        // We are behind by more than one block; gossip sync will close
        // the gap.
        tracing::debug!(
            epoch = block.epoch,
            head = head_epoch,
            "commit ahead of local chain"
        );
    }
    Json(OkResponse::OK)
}

/// `POST /view-change`
///
/// Tallies a view-change vote and, at quorum, rotates everyone to the
/// next view.
pub async fn view_change(
    State(state): State<SharedState>,
    Json(msg): Json<ViewChangeMessage>,
) -> Json<OkResponse> {
    let tallied = {
        let mut node = state.node.lock().await;
        let Some(vk) = node.registry.resolve_key(&msg.from) else {
            tracing::debug!(from = %msg.from, "view change from unknown validator dropped");
            return Json(OkResponse::OK);
        };
        match node.consensus.record_view_change(
            msg.epoch,
            msg.new_view,
            msg.from,
            msg.signature.clone(),
            &vk,
        ) {
            Ok(count) => {
                tracing::debug!(
                    epoch = msg.epoch,
                    new_view = msg.new_view,
                    count,
                    "view change tallied"
                );
                // If we are also still waiting at the old view, our own
                // timer will add our vote; adoption happens at quorum
                // either way.
                node.consensus.state() != EpochState::Committed
            }
            Err(e) => {
                tracing::debug!("view change dropped: {e}");
                false
            }
        }
    };

    if tallied {
        driver::adopt_view_if_quorum(&state, msg.epoch, msg.new_view).await;
    }
    Json(OkResponse::OK)
}
