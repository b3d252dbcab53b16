//! Per-epoch consensus state machine.
//!
//! The engine exclusively owns the current epoch/view, the active
//! proposal (at most one), the vote tally, the view-change tallies, and
//! the equivocation ledger. It is transport-free: the node's event loop
//! feeds it observed messages and acts on the returned outcomes. All
//! mutations happen on that single loop, so there is no interior
//! locking here.

use std::collections::{BTreeMap, HashMap};

use ed25519_dalek::VerifyingKey;

use crate::crypto;
use crate::types::{Address, Block, Hash256};

use super::config::ConsensusConfig;
use super::equivocation::{EquivocationEvidence, EquivocationLedger};
use super::error::ConsensusError;

/// Consensus state within one `(epoch, view)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochState {
    /// Between epochs; nothing in flight.
    Idle,
    /// Follower waiting for the elected leader's proposal.
    AwaitingProposal,
    /// Elected leader assembling/broadcasting its proposal.
    Proposing,
    /// A proposal is active and votes are being collected.
    Voting,
    /// The epoch's block is committed; terminal for the epoch.
    Committed,
    /// The proposal wait timed out; view-change messages are in flight.
    ViewChange,
}

/// Signing payload of a view-change message: canonical JSON over the
/// epoch and the proposed new view.
pub fn view_change_payload(epoch: u64, new_view: u64) -> String {
    crypto::canonical_json(&serde_json::json!({
        "epoch": epoch,
        "newView": new_view,
    }))
}

/// The consensus state machine for one node.
pub struct ConsensusEngine {
    cfg: ConsensusConfig,
    epoch: u64,
    view: u64,
    state: EpochState,
    active: Option<Block>,
    votes: BTreeMap<Address, String>,
    view_change_tally: HashMap<(u64, u64), BTreeMap<Address, String>>,
    equivocation: EquivocationLedger,
}

impl ConsensusEngine {
    /// Creates an idle engine.
    pub fn new(cfg: ConsensusConfig) -> Self {
        let window = cfg.equivocation_window;
        ConsensusEngine {
            cfg,
            epoch: 0,
            view: 0,
            state: EpochState::Idle,
            active: None,
            votes: BTreeMap::new(),
            view_change_tally: HashMap::new(),
            equivocation: EquivocationLedger::new(window),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &ConsensusConfig {
        &self.cfg
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Current view within the epoch.
    pub fn view(&self) -> u64 {
        self.view
    }

    /// Current state.
    pub fn state(&self) -> EpochState {
        self.state
    }

    /// The active proposal, if any.
    pub fn active(&self) -> Option<&Block> {
        self.active.as_ref()
    }

    /// Number of votes collected for the active proposal.
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Quorum size for a validator set of `n`.
    pub fn quorum(&self, n: usize) -> usize {
        self.cfg.quorum(n)
    }

    /// Enters a new epoch at view 0.
    ///
    /// Leaders start in `Proposing`, followers in `AwaitingProposal`.
    /// Stale view-change tallies from earlier epochs are dropped.
    pub fn begin_epoch(&mut self, epoch: u64, is_leader: bool) {
        self.epoch = epoch;
        self.view = 0;
        self.state = if is_leader {
            EpochState::Proposing
        } else {
            EpochState::AwaitingProposal
        };
        self.active = None;
        self.votes.clear();
        self.view_change_tally.retain(|(e, _), _| *e >= epoch);
    }

    /// Returns `true` while this node is a follower still waiting for a
    /// proposal at exactly `(epoch, view)`. This is the guard used by
    /// the view-change timer.
    pub fn is_awaiting(&self, epoch: u64, view: u64) -> bool {
        self.epoch == epoch && self.view == view && self.state == EpochState::AwaitingProposal
    }

    /// Records an observed block for equivocation detection.
    ///
    /// Returns evidence when a conflicting block by the same leader at
    /// the same epoch is already on record.
    pub fn observe_block(&mut self, block: &Block) -> Option<EquivocationEvidence> {
        self.equivocation.record(block)
    }

    /// Installs the active proposal and moves to `Voting`.
    ///
    /// For leaders this is the locally built block; for followers the
    /// validated incoming proposal.
    pub fn set_active(&mut self, block: Block) {
        self.active = Some(block);
        self.votes.clear();
        self.state = EpochState::Voting;
    }

    /// Registers one vote for the active proposal.
    ///
    /// The vote only counts while the referenced proposal is the active
    /// one in `Voting`; the signature must verify over the block hash
    /// under `voter_key`. Returns the updated tally size.
    pub fn register_vote(
        &mut self,
        voter: Address,
        block_hash: Hash256,
        signature: String,
        voter_key: &VerifyingKey,
    ) -> Result<usize, ConsensusError> {
        if self.state != EpochState::Voting {
            return Err(ConsensusError::StaleVote);
        }
        let Some(active) = &self.active else {
            return Err(ConsensusError::StaleVote);
        };
        if active.hash != block_hash {
            return Err(ConsensusError::StaleVote);
        }
        if crypto::address_of(voter_key) != voter {
            return Err(ConsensusError::VoteSignatureInvalid(voter));
        }
        if !crypto::verify(voter_key, block_hash.as_bytes(), &signature) {
            return Err(ConsensusError::VoteSignatureInvalid(voter));
        }
        self.votes.insert(voter, signature);
        Ok(self.votes.len())
    }

    /// Attaches the collected votes to the active proposal and returns
    /// the sealed block, leaving the engine in `Voting` until the caller
    /// commits. `None` when there is no active proposal.
    pub fn seal_active(&self) -> Option<Block> {
        let mut block = self.active.clone()?;
        block.votes = self.votes.clone();
        Some(block)
    }

    /// Marks the epoch committed and clears the in-flight proposal.
    pub fn mark_committed(&mut self) {
        self.state = EpochState::Committed;
        self.active = None;
        self.votes.clear();
    }

    /// Discards an in-flight proposal whose ancestry became stale (e.g.
    /// after a gossip chain replacement).
    pub fn discard_active(&mut self) {
        self.active = None;
        self.votes.clear();
        if self.state == EpochState::Voting {
            self.state = EpochState::AwaitingProposal;
        }
    }

    /// Follower timeout: enters `ViewChange` and returns the proposed
    /// next view.
    pub fn start_view_change(&mut self) -> u64 {
        self.state = EpochState::ViewChange;
        self.view + 1
    }

    /// Tallies one view-change message for `(epoch, new_view)`.
    ///
    /// The signature must verify over [`view_change_payload`] under
    /// `sender_key`. Returns the tally size for that `(epoch, view)`.
    pub fn record_view_change(
        &mut self,
        epoch: u64,
        new_view: u64,
        from: Address,
        signature: String,
        sender_key: &VerifyingKey,
    ) -> Result<usize, ConsensusError> {
        if crypto::address_of(sender_key) != from {
            return Err(ConsensusError::ViewChangeSignatureInvalid(from));
        }
        let payload = view_change_payload(epoch, new_view);
        if !crypto::verify(sender_key, payload.as_bytes(), &signature) {
            return Err(ConsensusError::ViewChangeSignatureInvalid(from));
        }
        let tally = self.view_change_tally.entry((epoch, new_view)).or_default();
        tally.insert(from, signature);
        Ok(tally.len())
    }

    /// Current tally size for `(epoch, new_view)`.
    pub fn view_change_tally(&self, epoch: u64, new_view: u64) -> usize {
        self.view_change_tally
            .get(&(epoch, new_view))
            .map_or(0, BTreeMap::len)
    }

    /// Adopts `new_view` after a view-change quorum: back to
    /// `AwaitingProposal` with the tally for that view consumed.
    pub fn enter_view(&mut self, new_view: u64) {
        self.view = new_view;
        self.state = EpochState::AwaitingProposal;
        self.active = None;
        self.votes.clear();
        let epoch = self.epoch;
        self.view_change_tally.remove(&(epoch, new_view));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::testutil::bare_block;

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(ConsensusConfig::default())
    }

    #[test]
    fn begin_epoch_sets_role_state() {
        let mut eng = engine();
        eng.begin_epoch(1, true);
        assert_eq!(eng.state(), EpochState::Proposing);
        assert_eq!((eng.epoch(), eng.view()), (1, 0));

        eng.begin_epoch(2, false);
        assert_eq!(eng.state(), EpochState::AwaitingProposal);
        assert!(eng.is_awaiting(2, 0));
        assert!(!eng.is_awaiting(1, 0));
    }

    #[test]
    fn votes_only_count_for_the_active_proposal() {
        let leader = Keypair::generate();
        let voter = Keypair::generate();
        let mut eng = engine();
        eng.begin_epoch(1, true);

        let block = bare_block(&leader, 1, Hash256::ZERO);
        eng.set_active(block.clone());

        let sig = voter.sign(block.hash.as_bytes());
        let count = eng
            .register_vote(voter.address(), block.hash, sig, &voter.verifying_key())
            .expect("vote for active proposal");
        assert_eq!(count, 1);

        // A vote for some other hash is stale.
        let other_hash = Hash256([9u8; 32]);
        let sig = voter.sign(other_hash.as_bytes());
        let err = eng
            .register_vote(voter.address(), other_hash, sig, &voter.verifying_key())
            .unwrap_err();
        assert!(matches!(err, ConsensusError::StaleVote));
    }

    #[test]
    fn forged_vote_signature_is_rejected() {
        let leader = Keypair::generate();
        let voter = Keypair::generate();
        let impostor = Keypair::generate();
        let mut eng = engine();
        eng.begin_epoch(1, true);

        let block = bare_block(&leader, 1, Hash256::ZERO);
        eng.set_active(block.clone());

        // Signed by the impostor but claimed under voter's address.
        let sig = impostor.sign(block.hash.as_bytes());
        let err = eng
            .register_vote(voter.address(), block.hash, sig, &impostor.verifying_key())
            .unwrap_err();
        assert!(matches!(err, ConsensusError::VoteSignatureInvalid(_)));
        assert_eq!(eng.vote_count(), 0);
    }

    #[test]
    fn seal_attaches_votes_and_commit_clears() {
        let leader = Keypair::generate();
        let voter = Keypair::generate();
        let mut eng = engine();
        eng.begin_epoch(1, true);

        let block = bare_block(&leader, 1, Hash256::ZERO);
        eng.set_active(block.clone());
        let sig = voter.sign(block.hash.as_bytes());
        eng.register_vote(voter.address(), block.hash, sig, &voter.verifying_key())
            .expect("vote");

        let sealed = eng.seal_active().expect("active proposal");
        assert_eq!(sealed.votes.len(), 1);
        assert!(sealed.votes.contains_key(&voter.address()));

        eng.mark_committed();
        assert_eq!(eng.state(), EpochState::Committed);
        assert!(eng.active().is_none());
        assert_eq!(eng.vote_count(), 0);
    }

    #[test]
    fn view_change_tallies_per_epoch_and_view() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let mut eng = engine();
        eng.begin_epoch(3, false);

        let next = eng.start_view_change();
        assert_eq!(next, 1);
        assert_eq!(eng.state(), EpochState::ViewChange);

        for kp in [&a, &b] {
            let sig = kp.sign(view_change_payload(3, 1).as_bytes());
            eng.record_view_change(3, 1, kp.address(), sig, &kp.verifying_key())
                .expect("valid view change");
        }
        assert_eq!(eng.view_change_tally(3, 1), 2);

        // Duplicate from the same sender does not double-count.
        let sig = a.sign(view_change_payload(3, 1).as_bytes());
        let count = eng
            .record_view_change(3, 1, a.address(), sig, &a.verifying_key())
            .expect("duplicate tolerated");
        assert_eq!(count, 2);

        eng.enter_view(1);
        assert!(eng.is_awaiting(3, 1));
        assert_eq!(eng.view_change_tally(3, 1), 0);
    }

    #[test]
    fn bad_view_change_signature_is_rejected() {
        let a = Keypair::generate();
        let mut eng = engine();
        eng.begin_epoch(3, false);

        // Signature over the wrong view.
        let sig = a.sign(view_change_payload(3, 2).as_bytes());
        let err = eng
            .record_view_change(3, 1, a.address(), sig, &a.verifying_key())
            .unwrap_err();
        assert!(matches!(err, ConsensusError::ViewChangeSignatureInvalid(_)));
    }

    #[test]
    fn observe_block_surfaces_equivocation() {
        let byzantine = Keypair::generate();
        let mut eng = engine();

        let b1 = bare_block(&byzantine, 2, Hash256::ZERO);
        let mut b2 = bare_block(&byzantine, 2, Hash256::ZERO);
        b2.timestamp += 1;
        b2.hash = b2.compute_hash();
        b2.leader_signature = byzantine.sign(b2.hash.as_bytes());

        assert!(eng.observe_block(&b1).is_none());
        let evidence = eng.observe_block(&b2).expect("conflict");
        assert_eq!(evidence.leader(), byzantine.address());
    }

    #[test]
    fn discard_active_returns_to_awaiting() {
        let leader = Keypair::generate();
        let mut eng = engine();
        eng.begin_epoch(1, false);
        eng.set_active(bare_block(&leader, 1, Hash256::ZERO));
        assert_eq!(eng.state(), EpochState::Voting);

        eng.discard_active();
        assert_eq!(eng.state(), EpochState::AwaitingProposal);
        assert!(eng.active().is_none());
    }
}
