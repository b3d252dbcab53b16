//! Equivocation detection.
//!
//! Every block observed via propose, commit, or chain sync is recorded
//! here, keyed by epoch. Two distinct blocks for the same `(epoch,
//! leader)` pair, each bearing a valid leader signature, are
//! cryptographic evidence of equivocation: the pair is returned to the
//! caller for slashing and is included in the rejection reply so other
//! observers can act on it too.
//!
//! Only the most recent `window` epochs are retained. Detection is a
//! per-node concern; this ledger is never replicated.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{Address, Block, Hash256};

/// Two conflicting signed blocks for the same `(epoch, leader)`.
///
/// Broadcastable: anyone can re-verify both leader signatures and the
/// hash conflict without trusting the reporter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquivocationEvidence {
    pub first: Block,
    pub second: Block,
}

impl EquivocationEvidence {
    /// The equivocating leader.
    pub fn leader(&self) -> Address {
        self.first.leader
    }

    /// The epoch both blocks claim.
    pub fn epoch(&self) -> u64 {
        self.first.epoch
    }

    /// Re-verifies the evidence from scratch: same epoch and leader,
    /// distinct canonical hashes, and both leader signatures valid.
    pub fn verify(&self) -> bool {
        self.first.epoch == self.second.epoch
            && self.first.leader == self.second.leader
            && self.first.hash != self.second.hash
            && self.first.compute_hash() == self.first.hash
            && self.second.compute_hash() == self.second.hash
            && self.first.verify_leader_signature()
            && self.second.verify_leader_signature()
    }
}

/// Sliding window of observed blocks, epoch → (hash → block).
pub struct EquivocationLedger {
    window: usize,
    by_epoch: BTreeMap<u64, HashMap<Hash256, Block>>,
}

impl EquivocationLedger {
    /// Creates a ledger retaining at most `window` epochs.
    pub fn new(window: usize) -> Self {
        EquivocationLedger {
            window: window.max(1),
            by_epoch: BTreeMap::new(),
        }
    }

    /// Records an observed block and scans its epoch for a conflicting
    /// one by the same leader.
    ///
    /// The caller must already have verified the block's leader
    /// signature; the conflicting candidate's signature is re-checked
    /// here so stored garbage can never produce evidence.
    pub fn record(&mut self, block: &Block) -> Option<EquivocationEvidence> {
        let bucket = self.by_epoch.entry(block.epoch).or_default();
        let conflict = bucket
            .values()
            .find(|other| other.leader == block.leader && other.hash != block.hash)
            .cloned();
        bucket.entry(block.hash).or_insert_with(|| block.clone());
        self.trim();

        let other = conflict?;
        let evidence = EquivocationEvidence {
            first: other,
            second: block.clone(),
        };
        evidence.verify().then_some(evidence)
    }

    /// Number of epochs currently retained.
    pub fn retained_epochs(&self) -> usize {
        self.by_epoch.len()
    }

    fn trim(&mut self) {
        while self.by_epoch.len() > self.window {
            let oldest = *self.by_epoch.keys().next().expect("map is non-empty");
            self.by_epoch.remove(&oldest);
        }
    }
}
