//! Leader-based BFT consensus.
//!
//! This module provides the block-production protocol:
//!
//! - configuration parameters ([`config::ConsensusConfig`]),
//! - deterministic leader election ([`election::elect_leader`]),
//! - deterministic block assembly ([`proposer::BlockBuilder`]),
//! - proposal and commit validation ([`validator`]),
//! - equivocation detection ([`equivocation`]),
//! - and the per-epoch state machine ([`engine::ConsensusEngine`]).
//!
//! The engine is transport-free; the node daemon owns the event loop
//! that feeds it network messages and broadcasts its outcomes.

pub mod config;
pub mod election;
pub mod engine;
pub mod equivocation;
pub mod error;
pub mod proposer;
pub mod validator;

pub use config::ConsensusConfig;
pub use election::elect_leader;
pub use engine::{ConsensusEngine, EpochState, view_change_payload};
pub use equivocation::{EquivocationEvidence, EquivocationLedger};
pub use error::ConsensusError;
pub use proposer::BlockBuilder;
pub use validator::{Acceptance, validate_committed, validate_proposal};
