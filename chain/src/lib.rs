//! Chain library crate.
//!
//! This crate provides the consensus core of the participation-weighted
//! payment network:
//!
//! - strongly-typed domain types and wire records (`types`),
//! - Ed25519/SHA-256 primitives and canonical JSON hashing (`crypto`),
//! - Merkle commitments and inclusion proofs (`merkle`),
//! - the committed chain and derived account state (`ledger`, `storage`),
//! - participation challenges and effectiveness scoring (`receipts`),
//! - the pending transaction pool (`mempool`),
//! - leader-based BFT block production (`consensus`),
//! - the peer registry and protocol transport (`mesh`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`, `context`).
//!
//! The node daemon composes these pieces around a single serialized
//! event loop; nothing in this crate spawns tasks or owns sockets except
//! the metrics exporter.

pub mod config;
pub mod consensus;
pub mod context;
pub mod crypto;
pub mod ledger;
pub mod mempool;
pub mod merkle;
pub mod mesh;
pub mod metrics;
pub mod receipts;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export top-level configuration and identity types.
pub use config::{MeshConfig, MetricsConfig, NodeConfig};
pub use context::NodeContext;

// Re-export "core" consensus types.
pub use consensus::{
    Acceptance, BlockBuilder, ConsensusConfig, ConsensusEngine, ConsensusError, EpochState,
    EquivocationEvidence, elect_leader, validate_committed, validate_proposal, view_change_payload,
};

// Re-export the ledger, pools, and storage backends.
pub use ledger::{AccountLookup, Ledger, LedgerError, TxProof};
pub use mempool::TxPool;
pub use receipts::{ReceiptConfig, ReceiptEngine, ReceiptError, work_result};
pub use storage::{ChainStore, DiskStore, MemStore, StorageError};

// Re-export mesh types.
pub use mesh::{
    AnnounceRequest, ChallengeResponse, GossipMessage, GossipPeer, MeshClient, MeshError,
    OkResponse, PeerInfo, PeerRecord, PeerRegistry, ProposeResponse, ViewChangeMessage,
    VoteMessage,
};

// Re-export metrics registry.
pub use metrics::{ConsensusMetrics, MetricsRegistry, run_prometheus_http_server};

// Re-export crypto identity and domain types at the crate root for
// convenience.
pub use crypto::Keypair;
pub use types::*;

/// Type alias for the ledger stack used by a real node.
pub type DefaultLedger = Ledger<DiskStore>;
