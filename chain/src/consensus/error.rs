//! Consensus error taxonomy.
//!
//! Every variant carries enough context for the wire-level rejection
//! string; none of them ever crosses a component boundary as a panic.
//! Messages that fail these checks are dropped (and, for equivocation,
//! answered with evidence).

use crate::types::{Address, Hash256};

/// Reasons a proposal, vote, commit, or view-change message is refused.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// The proposer is not the elected leader for `(epoch, view)`.
    #[error("wrong leader for epoch {epoch}: expected {expected}, got {got}")]
    WrongLeader {
        epoch: u64,
        expected: Address,
        got: Address,
    },
    /// `previousHash` neither matches the local head nor qualifies for
    /// the simplified catch-up rule.
    #[error("previousHash {got} does not match local head {head}")]
    PreviousHashMismatch { head: Hash256, got: Hash256 },
    /// The block's epoch is not the successor of the local head.
    #[error("epoch {got} is not the successor of local head epoch {head}")]
    EpochGap { head: u64, got: u64 },
    /// The embedded hash does not equal the canonical header hash.
    #[error("block hash does not match its canonical contents")]
    HashMismatch,
    /// The leader signature (or leader/key binding) does not verify.
    #[error("leader signature invalid")]
    LeaderSignatureInvalid,
    /// A Merkle commitment does not match the block contents.
    #[error("{0} does not match block contents")]
    RootMismatch(&'static str),
    /// A listed transaction fails the deterministic filter.
    #[error("transaction rejected by filter: {0}")]
    InvalidTransaction(String),
    /// A listed receipt is structurally incomplete.
    #[error("receipt missing required field {0}")]
    MalformedReceipt(&'static str),
    /// A vote arrived for something other than the active proposal.
    #[error("vote does not match the active proposal")]
    StaleVote,
    /// A vote signature failed to verify.
    #[error("invalid vote signature from {0}")]
    VoteSignatureInvalid(Address),
    /// A committed block does not carry enough valid votes.
    #[error("quorum not reached: {got} of {need} votes")]
    QuorumNotReached { got: usize, need: usize },
    /// Two conflicting blocks signed by one leader for one epoch.
    #[error("equivocation by {leader} at epoch {epoch}")]
    Equivocation { leader: Address, epoch: u64 },
    /// A view-change signature failed to verify.
    #[error("invalid view-change signature from {0}")]
    ViewChangeSignatureInvalid(Address),
    /// The sender of a protocol message is not a known validator.
    #[error("unknown validator {0}")]
    UnknownValidator(Address),
    /// No validators are known, so no leader can be elected.
    #[error("validator set is empty")]
    NoValidators,
}
