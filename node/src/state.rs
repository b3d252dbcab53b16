//! Shared application state.
//!
//! All mutable component state (ledger, consensus engine, receipt
//! engine, peer registry, transaction pool) lives inside one
//! [`NodeState`] behind a single `tokio::sync::Mutex`. That mutex *is*
//! the serialized consensus loop: handlers and background drivers take
//! it, mutate straight-line, and release it before any network await.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ed25519_dalek::VerifyingKey;
use tokio::sync::Mutex;

use chain::mesh::messages::GossipPeer;
use chain::{
    Address, AnnounceRequest, Block, ConsensusEngine, DefaultLedger, GossipMessage, LedgerError,
    MeshClient, MetricsRegistry, NodeContext, PeerRegistry, ReceiptEngine, TxPool,
};

/// The mutable half of a running node.
pub struct NodeState {
    /// Identity + configuration, immutable after startup.
    pub ctx: NodeContext,
    /// Committed chain and account state.
    pub ledger: DefaultLedger,
    /// Per-epoch consensus state machine.
    pub consensus: ConsensusEngine,
    /// Pending receipts and effectiveness scores.
    pub receipts: ReceiptEngine,
    /// Known peers.
    pub registry: PeerRegistry,
    /// Pending transactions.
    pub tx_pool: TxPool,
}

impl NodeState {
    /// The validator set for quorum and election: self plus every known
    /// peer, sorted.
    pub fn validator_set(&self) -> Vec<Address> {
        self.registry.validator_set(self.ctx.address)
    }

    /// Resolves a validator's verifying key: our own, or a peer's.
    pub fn resolve_key(&self, addr: &Address) -> Option<VerifyingKey> {
        if *addr == self.ctx.address {
            return Some(self.ctx.keypair.verifying_key());
        }
        self.registry.resolve_key(addr)
    }

    /// The announce body this node sends on bootstrap.
    pub fn announce_request(&self) -> AnnounceRequest {
        AnnounceRequest {
            id: self.ctx.name.clone(),
            url: self.ctx.public_url.clone(),
            public_key_pem: self.ctx.public_key_pem.clone(),
            public_key_hash: self.ctx.public_key_hash.clone(),
        }
    }

    /// The gossip beacon this node sends each round. The peer list
    /// includes a self entry so second-hand recipients learn our key.
    pub fn gossip_message(&self) -> GossipMessage {
        let (_, head_hash) = self.ledger.head();
        let mut peers = self.registry.gossip_peers();
        peers.push(GossipPeer {
            id: self.ctx.name.clone(),
            url: self.ctx.public_url.clone(),
            public_key_pem: self.ctx.public_key_pem.clone(),
            public_key_hash: self.ctx.public_key_hash.clone(),
        });
        GossipMessage {
            from: self.ctx.address,
            chain_length: self.ledger.len() as u64,
            last_block_hash: head_hash,
            peers,
        }
    }

    /// Commits a validated block: appends to the ledger, prunes the
    /// pending pools, folds in the effectiveness updates, and marks the
    /// epoch committed if the engine is still on it.
    ///
    /// Persistence failures bubble up; they are fatal to the node.
    pub fn commit_block(
        &mut self,
        block: Block,
        metrics: &MetricsRegistry,
    ) -> Result<(), LedgerError> {
        let epoch = block.epoch;
        self.ledger.append(block.clone())?;

        self.tx_pool.prune(&block.transactions);
        self.receipts.prune(&block.receipts);
        self.receipts.apply_updates(&block.effectiveness_updates);
        for (addr, value) in &block.effectiveness_updates {
            self.registry.note_effectiveness(addr, *value);
        }

        metrics.consensus.blocks_committed.inc();
        if self.consensus.epoch() == epoch {
            self.consensus.mark_committed();
        }
        tracing::info!(
            epoch,
            hash = %block.hash,
            txs = block.transactions.len(),
            receipts = block.receipts.len(),
            "committed block"
        );
        Ok(())
    }

    /// Applies an equivocation slash from verified evidence. Counts the
    /// event once per observer.
    pub fn apply_evidence_slash(
        &mut self,
        evidence: &chain::EquivocationEvidence,
        metrics: &MetricsRegistry,
    ) {
        if !evidence.verify() {
            return;
        }
        let leader = evidence.leader();
        let amount = self.ctx.config.consensus.slash_amount;
        match self.ledger.apply_slash(leader, amount) {
            Ok(Some(debit)) => {
                metrics.consensus.slash_events.inc();
                tracing::warn!(
                    leader = %leader,
                    epoch = evidence.epoch(),
                    debit,
                    "slashed equivocating leader"
                );
            }
            Ok(None) => {} // already slashed on this chain
            Err(e) => {
                tracing::error!("persistence failure while applying slash: {e}");
                std::process::exit(1);
            }
        }
    }
}

/// Shared state held by the HTTP handlers and background tasks.
pub struct AppState {
    /// The serialized consensus loop.
    pub node: Mutex<NodeState>,
    /// Metrics registry shared between consensus and the exporter.
    pub metrics: Arc<MetricsRegistry>,
    /// Outbound protocol client.
    pub client: MeshClient,
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;

/// Wall-clock milliseconds since the Unix epoch. Falls back to 0 if the
/// system clock predates the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
