//! Background drivers: epoch ticker, leader rounds, view-change timers,
//! and the gossip loop.
//!
//! Each driver takes the node mutex only for straight-line state
//! mutation and releases it before any network await; results of
//! outbound calls are re-validated against the current `(epoch, view,
//! active proposal)` before they are applied. Transport failures are
//! logged at debug level and otherwise absorbed.

use std::time::{Duration, Instant};

use rand::Rng;

use chain::{
    Address, Challenge, EpochState, LedgerError, ViewChangeMessage, crypto, elect_leader,
    view_change_payload,
};

use crate::state::{SharedState, now_ms};

/// Drives one epoch per `epochDuration`: challenge issuance, then either
/// a leader round or a follower view-change timer.
pub async fn run_epoch_loop(state: SharedState) {
    let interval = {
        let node = state.node.lock().await;
        Duration::from_secs(node.ctx.config.consensus.epoch_duration_secs)
    };

    loop {
        tokio::time::sleep(interval).await;
        run_epoch(&state).await;
    }
}

async fn run_epoch(state: &SharedState) {
    let (epoch, is_leader, challenge_jobs) = {
        let mut node = state.node.lock().await;
        let now = now_ms();
        let heartbeat = node.ctx.config.mesh.heartbeat_timeout_secs;
        for addr in node.registry.evict_stale(now, heartbeat) {
            tracing::info!(peer = %addr, "evicted silent peer");
        }

        let epoch = node.ledger.head().0 + 1;
        node.receipts.expire_before(epoch);

        let validators = node.validator_set();
        let leader = elect_leader(epoch, 0, &validators);
        let is_leader = leader == Some(node.ctx.address);
        node.consensus.begin_epoch(epoch, is_leader);
        tracing::debug!(
            epoch,
            leader = %leader.map(|a| a.to_string()).unwrap_or_default(),
            validators = validators.len(),
            "epoch started"
        );

        let peers = node.registry.addresses();
        let targets = node.receipts.pick_targets(&peers);
        let self_addr = node.ctx.address;
        let jobs: Vec<(Address, String, Challenge)> = targets
            .iter()
            .filter_map(|t| {
                node.registry.get(t).map(|r| {
                    (
                        *t,
                        r.url.clone(),
                        node.receipts.build_challenge(self_addr, *t, epoch),
                    )
                })
            })
            .collect();
        (epoch, is_leader, jobs)
    };

    issue_challenges(state, challenge_jobs).await;

    if is_leader {
        lead_round(state, epoch, 0).await;
    } else {
        tokio::spawn(follower_timer(state.clone(), epoch, 0));
    }
}

/// Sends the epoch's challenges concurrently and pools the receipts
/// that come back signed and in time. Late or missing responses are
/// simply absent; the wait is bounded by the challenge deadline, well
/// inside the view-change timeout.
async fn issue_challenges(state: &SharedState, jobs: Vec<(Address, String, Challenge)>) {
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| tokio::spawn(issue_one_challenge(state.clone(), job)))
        .collect();
    for handle in handles {
        let _ = handle.await;
    }
}

async fn issue_one_challenge(state: SharedState, (addr, url, challenge): (Address, String, Challenge)) {
    state.metrics.consensus.challenges_sent.inc();
    match state.client.challenge(&url, &challenge).await {
        Ok(resp) => {
            let Some(vk) = crypto::public_key_from_pem(&resp.public_key_pem) else {
                tracing::debug!(peer = %addr, "challenge response with unparsable key");
                return;
            };
            let mut node = state.node.lock().await;
            let self_addr = node.ctx.address;
            match node.receipts.accept(resp.receipt, &vk, self_addr) {
                Ok(()) => {
                    state.metrics.consensus.receipts_verified.inc();
                    node.registry.touch(&addr, now_ms());
                }
                Err(e) => tracing::debug!(peer = %addr, "receipt rejected: {e}"),
            }
        }
        Err(e) => tracing::debug!(peer = %addr, "challenge failed: {e}"),
    }
}

/// Leads one `(epoch, view)`: build, self-vote, propose to every peer,
/// and commit + broadcast once quorum is reached.
pub async fn lead_round(state: &SharedState, epoch: u64, view: u64) {
    let (block, peers) = {
        let mut node = state.node.lock().await;
        if node.consensus.epoch() != epoch || node.consensus.view() != view {
            return; // superseded while we waited for the lock
        }
        let (head_epoch, head_hash) = node.ledger.head();
        if head_epoch + 1 != epoch {
            return;
        }

        let cfg = node.ctx.config.consensus.clone();
        let validators = node.validator_set();
        let effectiveness =
            node.receipts
                .next_effectiveness(epoch, &validators, cfg.epoch_duration_secs);

        let started = Instant::now();
        let builder = chain::BlockBuilder::from_config(&cfg);
        let block = builder.build(
            &node.ledger,
            epoch,
            head_hash,
            &node.ctx.keypair,
            node.receipts.snapshot(),
            &node.tx_pool.snapshot(),
            effectiveness,
            now_ms(),
        );
        state
            .metrics
            .consensus
            .block_build_seconds
            .observe(started.elapsed().as_secs_f64());
        state.metrics.consensus.blocks_produced.inc();

        node.consensus.set_active(block.clone());
        node.consensus.observe_block(&block);

        // The leader's own vote.
        let signature = node.ctx.keypair.sign(block.hash.as_bytes());
        let self_addr = node.ctx.address;
        let self_key = node.ctx.keypair.verifying_key();
        if let Err(e) = node
            .consensus
            .register_vote(self_addr, block.hash, signature, &self_key)
        {
            tracing::error!("own vote rejected: {e}");
            return;
        }

        let peers: Vec<(Address, String)> = node
            .registry
            .iter()
            .map(|(a, r)| (*a, r.url.clone()))
            .collect();
        (block, peers)
    };

    tracing::info!(epoch, view, hash = %block.hash, "proposing block");

    for (addr, url) in &peers {
        match state.client.propose(url, &block).await {
            Ok(resp) if resp.ok => {
                let Some(vote) = resp.vote else { continue };
                let Some(vk) = crypto::public_key_from_b64(&vote.voter_pub_key) else {
                    continue;
                };
                let mut node = state.node.lock().await;
                node.registry.touch(addr, now_ms());
                if let Err(e) =
                    node.consensus
                        .register_vote(vote.voter, vote.block_hash, vote.signature, &vk)
                {
                    tracing::debug!(peer = %addr, "vote rejected: {e}");
                }
            }
            Ok(resp) => {
                tracing::debug!(
                    peer = %addr,
                    "proposal refused: {}",
                    resp.error.unwrap_or_default()
                );
            }
            Err(e) => tracing::debug!(peer = %addr, "proposal delivery failed: {e}"),
        }
    }

    try_commit_as_leader(state, epoch).await;
}

/// Commits the active proposal if the vote tally meets quorum, then
/// broadcasts the committed block.
pub async fn try_commit_as_leader(state: &SharedState, epoch: u64) {
    let committed = {
        let mut node = state.node.lock().await;
        if node.consensus.epoch() != epoch || node.consensus.state() != EpochState::Voting {
            return;
        }
        // Only the proposer of the active block commits it.
        if node
            .consensus
            .active()
            .is_none_or(|b| b.leader != node.ctx.address)
        {
            return;
        }
        let quorum = node.consensus.quorum(node.validator_set().len());
        if node.consensus.vote_count() < quorum {
            tracing::info!(
                epoch,
                votes = node.consensus.vote_count(),
                quorum,
                "no quorum for this round"
            );
            return;
        }
        let Some(sealed) = node.consensus.seal_active() else {
            return;
        };
        match node.commit_block(sealed.clone(), &state.metrics) {
            Ok(()) => {}
            Err(LedgerError::Storage(e)) => {
                tracing::error!("persistence failure on commit: {e}");
                std::process::exit(1);
            }
            Err(e) => {
                tracing::warn!("commit aborted: {e}");
                return;
            }
        }
        let peers: Vec<String> = node.registry.iter().map(|(_, r)| r.url.clone()).collect();
        Some((sealed, peers))
    };

    if let Some((block, peers)) = committed {
        for url in peers {
            if let Err(e) = state.client.send_commit(&url, &block).await {
                tracing::debug!("commit broadcast to {url} failed: {e}");
            }
        }
    }
}

/// Follower patience timer for `(epoch, view)`. Fires a view change if
/// no proposal became active in time.
pub fn follower_timer(
    state: SharedState,
    epoch: u64,
    view: u64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        let timeout = {
            let node = state.node.lock().await;
            Duration::from_secs(node.ctx.config.consensus.view_change_timeout_secs)
        };
        tokio::time::sleep(timeout).await;

        let broadcast = {
            let mut node = state.node.lock().await;
            if !node.consensus.is_awaiting(epoch, view) {
                return; // a proposal arrived, or the epoch moved on
            }
            let new_view = node.consensus.start_view_change();
            state.metrics.consensus.view_changes.inc();
            tracing::info!(epoch, view, new_view, "leader silent, starting view change");

            let payload = view_change_payload(epoch, new_view);
            let signature = node.ctx.keypair.sign(payload.as_bytes());
            let self_addr = node.ctx.address;
            let self_key = node.ctx.keypair.verifying_key();
            // Tally our own view-change vote alongside the broadcast.
            if let Err(e) =
                node.consensus
                    .record_view_change(epoch, new_view, self_addr, signature.clone(), &self_key)
            {
                tracing::error!("own view-change vote rejected: {e}");
            }

            let msg = ViewChangeMessage {
                epoch,
                old_view: view,
                new_view,
                from: self_addr,
                signature,
            };
            let peers: Vec<String> = node.registry.iter().map(|(_, r)| r.url.clone()).collect();
            (msg, peers)
        };

        let (msg, peers) = broadcast;
        for url in &peers {
            if let Err(e) = state.client.send_view_change(url, &msg).await {
                tracing::debug!("view-change delivery to {url} failed: {e}");
            }
        }

        adopt_view_if_quorum(&state, epoch, msg.new_view).await;
    })
}

/// Moves to `new_view` once its tally reaches quorum: the new leader
/// starts its round, everyone else re-arms the patience timer.
pub fn adopt_view_if_quorum<'a>(
    state: &'a SharedState,
    epoch: u64,
    new_view: u64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let role = {
            let mut node = state.node.lock().await;
            if node.consensus.epoch() != epoch || node.consensus.view() >= new_view {
                return;
            }
            let validators = node.validator_set();
            let quorum = node.consensus.quorum(validators.len());
            if node.consensus.view_change_tally(epoch, new_view) < quorum {
                return;
            }
            node.consensus.enter_view(new_view);
            let leader = elect_leader(epoch, new_view, &validators);
            tracing::info!(
                epoch,
                new_view,
                leader = %leader.map(|a| a.to_string()).unwrap_or_default(),
                "view change quorum reached"
            );
            leader == Some(node.ctx.address)
        };

        if role {
            lead_round(state, epoch, new_view).await;
        } else {
            tokio::spawn(follower_timer(state.clone(), epoch, new_view));
        }
    })
}

/// Periodic gossip: touch every peer, share our peer list, and
/// occasionally pull a longer (or conflicting) chain.
pub async fn run_gossip_loop(state: SharedState) {
    let (interval, pull_probability) = {
        let node = state.node.lock().await;
        (
            Duration::from_secs(node.ctx.config.mesh.gossip_interval_secs),
            node.ctx.config.mesh.chain_pull_probability,
        )
    };

    loop {
        tokio::time::sleep(interval).await;

        let (msg, peers, my_len, my_head) = {
            let node = state.node.lock().await;
            let msg = node.gossip_message();
            let peers: Vec<(Address, String, u64)> = node
                .registry
                .iter()
                .map(|(a, r)| (*a, r.url.clone(), r.chain_length))
                .collect();
            let (_, head_hash) = node.ledger.head();
            (msg, peers, node.ledger.len() as u64, head_hash)
        };

        for (addr, url, peer_len) in peers {
            match state.client.gossip(&url, &msg).await {
                Ok(_) => {
                    let mut node = state.node.lock().await;
                    node.registry.touch(&addr, now_ms());
                }
                Err(e) => {
                    tracing::debug!(peer = %addr, "gossip failed: {e}");
                    continue;
                }
            }

            // Naive longest-chain adoption, plus an equal-length pull to
            // inspect conflicting heads for equivocation evidence.
            let conflicting_head = {
                let node = state.node.lock().await;
                node.registry.get(&addr).is_some_and(|r| {
                    r.chain_length == my_len
                        && my_len > 0
                        && r.last_block_hash.is_some_and(|h| h != my_head)
                })
            };
            let pull_longer =
                peer_len > my_len && rand::thread_rng().gen_bool(pull_probability.clamp(0.0, 1.0));
            if pull_longer || conflicting_head {
                sync_chain_from(&state, &url).await;
            }
        }
    }
}

/// Fetches a peer's chain; records every block for equivocation
/// detection and adopts the chain wholesale when it is longer and
/// verifies.
pub async fn sync_chain_from(state: &SharedState, url: &str) {
    let chain = match state.client.fetch_chain(url).await {
        Ok(chain) => chain,
        Err(e) => {
            tracing::debug!("chain fetch from {url} failed: {e}");
            return;
        }
    };

    let mut node = state.node.lock().await;
    for block in &chain {
        if !block.verify_leader_signature() {
            continue;
        }
        if let Some(evidence) = node.consensus.observe_block(block) {
            node.apply_evidence_slash(&evidence, &state.metrics);
        }
    }

    if chain.len() <= node.ledger.len() {
        return;
    }
    let keys: Vec<String> = chain
        .iter()
        .flat_map(|b| b.transactions.iter().map(|tx| tx.dedup_key()))
        .collect();
    match node.ledger.replace_chain(chain) {
        Ok(()) => {
            node.consensus.discard_active();
            node.tx_pool.mark_seen(keys);
            tracing::info!(len = node.ledger.len(), "adopted longer chain from {url}");
        }
        Err(e) => tracing::warn!("rejected longer chain from {url}: {e}"),
    }
}

/// Startup bootstrap: announce to the configured peer and adopt its
/// chain if it is ahead of ours.
pub async fn bootstrap(state: &SharedState, bootstrap_url: &str) {
    let announce = {
        let node = state.node.lock().await;
        node.announce_request()
    };
    match state.client.announce(bootstrap_url, &announce).await {
        Ok(_) => tracing::info!("announced to bootstrap peer {bootstrap_url}"),
        Err(e) => tracing::warn!("bootstrap announce to {bootstrap_url} failed: {e}"),
    }
    // Peer records (with keys) arrive via the bootstrap peer's gossip;
    // the chain we can pull right away.
    sync_chain_from(state, bootstrap_url).await;
}
