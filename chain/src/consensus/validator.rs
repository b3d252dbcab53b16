//! Proposal and commit validation.
//!
//! Followers re-derive everything a proposal claims before voting for
//! it: leader election, the canonical hash, the leader signature, the
//! Merkle commitments, the deterministic transaction filter, and the
//! structural shape of every receipt. Committed blocks are re-checked
//! for leader signature and a quorum of valid votes before they are
//! appended.

use ed25519_dalek::VerifyingKey;

use crate::crypto;
use crate::ledger::AccountLookup;
use crate::merkle;
use crate::types::{Address, Block, Hash256};

use super::election::elect_leader;
use super::error::ConsensusError;
use super::proposer::BlockBuilder;

/// How a valid proposal relates to the local chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acceptance {
    /// The proposal extends the local head directly.
    Extends,
    /// The proposal references an ancestor we have not seen but is our
    /// head's immediate successor by epoch. Provisionally acceptable to
    /// drive chain advancement; the state-dependent checks are skipped
    /// because the pre-state is unknown. This path is a known, flagged
    /// risk on adversarial meshes.
    CatchUp,
}

/// Validates a proposal against the local head, account state, and
/// validator set at `view`.
pub fn validate_proposal<A: AccountLookup>(
    block: &Block,
    head: (u64, Hash256),
    accounts: &A,
    validators: &[Address],
    view: u64,
) -> Result<Acceptance, ConsensusError> {
    let (head_epoch, head_hash) = head;

    if block.epoch != head_epoch + 1 {
        return Err(ConsensusError::EpochGap {
            head: head_epoch,
            got: block.epoch,
        });
    }
    let acceptance = if block.previous_hash == head_hash {
        Acceptance::Extends
    } else {
        Acceptance::CatchUp
    };

    let expected = elect_leader(block.epoch, view, validators).ok_or(ConsensusError::NoValidators)?;
    if block.leader != expected {
        return Err(ConsensusError::WrongLeader {
            epoch: block.epoch,
            expected,
            got: block.leader,
        });
    }

    if block.compute_hash() != block.hash {
        return Err(ConsensusError::HashMismatch);
    }
    if !block.verify_leader_signature() {
        return Err(ConsensusError::LeaderSignatureInvalid);
    }

    let tx_leaves: Vec<Hash256> = block.transactions.iter().map(crypto::hash_canonical).collect();
    if merkle::root(&tx_leaves) != block.tx_root {
        return Err(ConsensusError::RootMismatch("txRoot"));
    }
    let receipt_leaves: Vec<Hash256> = block.receipts.iter().map(crypto::hash_canonical).collect();
    if merkle::root(&receipt_leaves) != block.receipt_root {
        return Err(ConsensusError::RootMismatch("receiptRoot"));
    }

    for receipt in &block.receipts {
        if let Some(field) = receipt.missing_field() {
            return Err(ConsensusError::MalformedReceipt(field));
        }
    }

    for tx in &block.transactions {
        if !tx.verify_signature() {
            return Err(ConsensusError::InvalidTransaction(format!(
                "signature invalid for tx from {}",
                tx.from
            )));
        }
    }

    if acceptance == Acceptance::Extends {
        // State-dependent checks need the pre-state, which we only have
        // when the proposal builds on our head.
        let (accepted, overlay) = BlockBuilder::filter_transactions(accounts, &block.transactions);
        if accepted != block.transactions {
            return Err(ConsensusError::InvalidTransaction(
                "listed transactions do not survive the deterministic filter".to_string(),
            ));
        }
        if BlockBuilder::state_root(accounts, &overlay, &block.rewards) != block.state_root {
            return Err(ConsensusError::RootMismatch("stateRoot"));
        }
    }

    Ok(acceptance)
}

/// Validates a committed block: canonical hash, leader signature, and a
/// quorum of verifiable votes.
///
/// `resolve_key` maps a voter address to its known public key; votes
/// from unknown voters don't count toward quorum, and a vote that fails
/// verification under a known key rejects the whole block.
pub fn validate_committed(
    block: &Block,
    quorum: usize,
    resolve_key: &dyn Fn(&Address) -> Option<VerifyingKey>,
) -> Result<(), ConsensusError> {
    if block.compute_hash() != block.hash {
        return Err(ConsensusError::HashMismatch);
    }
    if !block.verify_leader_signature() {
        return Err(ConsensusError::LeaderSignatureInvalid);
    }

    let mut valid = 0usize;
    for (voter, signature) in &block.votes {
        let Some(vk) = resolve_key(voter) else {
            continue;
        };
        if !crypto::verify(&vk, block.hash.as_bytes(), signature) {
            return Err(ConsensusError::VoteSignatureInvalid(*voter));
        }
        valid += 1;
    }

    if valid < quorum {
        return Err(ConsensusError::QuorumNotReached {
            got: valid,
            need: quorum,
        });
    }
    Ok(())
}
