//! Participation receipts and effectiveness scoring.
//!
//! At the start of every epoch each node challenges a few peers. The
//! responder runs [`work_result`], a fixed pseudo-random workload that
//! is part of the wire contract, and returns a signed [`Receipt`].
//! Verified receipts accumulate in a pending pool until a leader commits
//! them, at which point they drive the per-address effectiveness score:
//! addresses that served a challenge ramp up, everyone else decays.
//!
//! Effectiveness is keyed by address, not node name, so rotating a
//! display name does not reset the score of an equivalent key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use ed25519_dalek::VerifyingKey;
use rand::RngCore;

use crate::crypto::{self, Keypair};
use crate::types::{Address, Challenge, Receipt};

/// Seconds per day, for converting epoch durations into ramp/decay time.
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Tuning for challenge issuance and effectiveness scoring.
#[derive(Clone, Debug)]
pub struct ReceiptConfig {
    /// Peers challenged per epoch.
    pub challenges_per_epoch: usize,
    /// Protocol-level deadline for a challenge round trip, in seconds.
    pub challenge_timeout_secs: u64,
    /// Ramp time constant, in days. Governs how fast a responsive
    /// address approaches effectiveness 1.
    pub ramp_days: f64,
    /// Decay time constant, in days. Governs how fast a silent address
    /// falls back toward 0.
    pub decay_days: f64,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            challenges_per_epoch: 2,
            challenge_timeout_secs: 4,
            ramp_days: 40.0,
            decay_days: 7.0,
        }
    }
}

/// Errors raised while accepting a receipt.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("receipt is missing {0}")]
    MissingField(&'static str),
    #[error("receipt signature does not verify under the responder key")]
    SignatureInvalid,
    #[error("receipt responder does not match the signing key")]
    WrongResponder,
    #[error("receipt is not addressed to this node")]
    WrongChallenger,
    #[error("duplicate receipt for challenge {0}")]
    Duplicate(String),
}

/// The fixed challenge workload.
///
/// `r ← 0; for i in 0..10000: r ← (r·31 + i) mod 1_000_000_007`. The
/// exact recurrence is part of the wire contract: every implementation
/// must produce the same `workResult`.
pub fn work_result() -> u64 {
    let mut r: u64 = 0;
    for i in 0..10_000u64 {
        r = (r.wrapping_mul(31) + i) % 1_000_000_007;
    }
    r
}

/// Per-node engine owning the pending receipt pool and the local
/// effectiveness estimate.
pub struct ReceiptEngine {
    cfg: ReceiptConfig,
    pending: Vec<Receipt>,
    seen_challenges: HashSet<String>,
    effectiveness: HashMap<Address, f64>,
    cursor: usize,
}

impl ReceiptEngine {
    /// Creates an engine with the given tuning.
    pub fn new(cfg: ReceiptConfig) -> Self {
        ReceiptEngine {
            cfg,
            pending: Vec::new(),
            seen_challenges: HashSet::new(),
            effectiveness: HashMap::new(),
            cursor: 0,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &ReceiptConfig {
        &self.cfg
    }

    /// Picks up to `challenges_per_epoch` targets round-robin over the
    /// known peer set (already excluding self).
    pub fn pick_targets(&mut self, peers: &[Address]) -> Vec<Address> {
        if peers.is_empty() {
            return Vec::new();
        }
        let mut sorted: Vec<Address> = peers.to_vec();
        sorted.sort();

        let count = self.cfg.challenges_per_epoch.min(sorted.len());
        let mut targets = Vec::with_capacity(count);
        for i in 0..count {
            targets.push(sorted[(self.cursor + i) % sorted.len()]);
        }
        self.cursor = (self.cursor + count) % sorted.len();
        targets
    }

    /// Builds a fresh challenge from `from` to `to` for `epoch`.
    pub fn build_challenge(&self, from: Address, to: Address, epoch: u64) -> Challenge {
        let mut id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut id);
        Challenge {
            challenge_id: hex::encode(id),
            from,
            to,
            epoch,
        }
    }

    /// Responder side: runs the workload and returns a signed receipt.
    pub fn respond(challenge: &Challenge, keypair: &Keypair, timestamp: u64) -> Receipt {
        let started = Instant::now();
        let work = work_result();
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut receipt = Receipt {
            challenge_id: challenge.challenge_id.clone(),
            from: challenge.from,
            to: challenge.to,
            epoch: challenge.epoch,
            success: true,
            latency_ms,
            timestamp,
            work_result: work,
            signature: String::new(),
        };
        let payload = crypto::canonical_json(&receipt.signing_payload());
        receipt.signature = keypair.sign(payload.as_bytes());
        receipt
    }

    /// Challenger side: verifies and pools a returned receipt.
    ///
    /// `self_addr` is the challenger's own address; `responder_key` comes
    /// from the challenge response body.
    pub fn accept(
        &mut self,
        receipt: Receipt,
        responder_key: &VerifyingKey,
        self_addr: Address,
    ) -> Result<(), ReceiptError> {
        if let Some(field) = receipt.missing_field() {
            return Err(ReceiptError::MissingField(field));
        }
        if receipt.from != self_addr {
            return Err(ReceiptError::WrongChallenger);
        }
        if crypto::address_of(responder_key) != receipt.to {
            return Err(ReceiptError::WrongResponder);
        }
        if !receipt.verify(responder_key) {
            return Err(ReceiptError::SignatureInvalid);
        }
        if !self.seen_challenges.insert(receipt.challenge_id.clone()) {
            return Err(ReceiptError::Duplicate(receipt.challenge_id));
        }
        self.pending.push(receipt);
        Ok(())
    }

    /// Pending receipts, in arrival order.
    pub fn pending(&self) -> &[Receipt] {
        &self.pending
    }

    /// Clones the pending receipts for block assembly.
    pub fn snapshot(&self) -> Vec<Receipt> {
        self.pending.clone()
    }

    /// Drops receipts that were included in a committed block.
    pub fn prune(&mut self, included: &[Receipt]) {
        let ids: HashSet<&str> = included.iter().map(|r| r.challenge_id.as_str()).collect();
        self.pending.retain(|r| !ids.contains(r.challenge_id.as_str()));
    }

    /// Drops stale receipts from epochs before `epoch`. Called at epoch
    /// start so receipts that never made it into a block don't pool up.
    pub fn expire_before(&mut self, epoch: u64) {
        self.pending.retain(|r| r.epoch + 1 >= epoch);
    }

    /// Computes the next effectiveness value for every address in
    /// `known`, based on whether the address produced a successful
    /// pending receipt for `epoch`.
    ///
    /// Responsive addresses ramp: `e' = 1 − (1 − e)·exp(−Δd/R)`; silent
    /// ones decay: `e' = e·exp(−Δd/D)`; both clamped to `[0, 1]`, with
    /// `Δd = epoch_duration / 86400` days.
    pub fn next_effectiveness(
        &self,
        epoch: u64,
        known: &[Address],
        epoch_duration_secs: u64,
    ) -> BTreeMap<Address, f64> {
        let delta_days = epoch_duration_secs as f64 / SECONDS_PER_DAY;
        let responded: HashSet<Address> = self
            .pending
            .iter()
            .filter(|r| r.epoch == epoch && r.success)
            .map(|r| r.to)
            .collect();

        known
            .iter()
            .map(|addr| {
                let e = self.effectiveness.get(addr).copied().unwrap_or(0.0);
                let next = if responded.contains(addr) {
                    1.0 - (1.0 - e) * (-delta_days / self.cfg.ramp_days).exp()
                } else {
                    e * (-delta_days / self.cfg.decay_days).exp()
                };
                (*addr, next.clamp(0.0, 1.0))
            })
            .collect()
    }

    /// Folds committed effectiveness updates into the local estimate.
    pub fn apply_updates(&mut self, updates: &BTreeMap<Address, f64>) {
        for (addr, value) in updates {
            self.effectiveness.insert(*addr, value.clamp(0.0, 1.0));
        }
    }

    /// Current effectiveness for `addr` (0 when unknown).
    pub fn effectiveness_of(&self, addr: &Address) -> f64 {
        self.effectiveness.get(addr).copied().unwrap_or(0.0)
    }

    /// Current effectiveness map.
    pub fn effectiveness(&self) -> &HashMap<Address, f64> {
        &self.effectiveness
    }
}
