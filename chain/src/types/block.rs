// chain/src/types/block.rs

//! Block types and canonical block hashing.
//!
//! A block records the outcome of one participation epoch: the verified
//! receipts, the filtered batch of transactions, the effectiveness and
//! reward deltas, and three Merkle commitments. The block hash is the
//! SHA-256 of the canonical JSON of the block *without* the `hash`,
//! `leaderSignature`, and `votes` fields; the leader signature and every
//! vote sign that hash.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto;

use super::{Address, Hash256, Receipt, Transaction};

/// One committed (or proposed) block of the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Participation round this block concludes. Strictly increasing by
    /// one along the committed chain.
    pub epoch: u64,
    /// Hash of the predecessor block; all-zero for the first block.
    pub previous_hash: Hash256,
    /// Address of the elected leader that assembled this block.
    pub leader: Address,
    /// Base64 DER (SPKI) public key of the leader.
    pub leader_pub_key: String,
    /// Leader wall-clock time at assembly, milliseconds since epoch.
    pub timestamp: u64,
    /// Verified participation receipts included this epoch.
    pub receipts: Vec<Receipt>,
    /// Transactions accepted by the deterministic filter, in input order.
    pub transactions: Vec<Transaction>,
    /// Post-epoch effectiveness per known address, each in `[0, 1]`.
    pub effectiveness_updates: BTreeMap<Address, f64>,
    /// Reward credits funded by the per-epoch pool. Zero entries are
    /// omitted.
    pub rewards: BTreeMap<Address, u64>,
    /// Merkle root over the canonical hashes of `transactions`.
    pub tx_root: Hash256,
    /// Merkle root over the canonical hashes of `receipts`.
    pub receipt_root: Hash256,
    /// Merkle root over the touched-account snapshot after this block.
    pub state_root: Hash256,
    /// Canonical header hash (see module docs).
    pub hash: Hash256,
    /// Base64 leader signature over `hash`.
    pub leader_signature: String,
    /// Voter address → base64 signature over `hash`. Populated on commit.
    pub votes: BTreeMap<Address, String>,
}

impl Block {
    /// The JSON value covered by the block hash: every field except
    /// `hash`, `leaderSignature`, and `votes`.
    pub fn signing_payload(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).expect("block is always serializable");
        if let serde_json::Value::Object(map) = &mut v {
            map.remove("hash");
            map.remove("leaderSignature");
            map.remove("votes");
        }
        v
    }

    /// Recomputes the canonical block hash from the current contents.
    pub fn compute_hash(&self) -> Hash256 {
        crypto::hash_canonical(&self.signing_payload())
    }

    /// Verifies that `leaderSignature` is a valid signature over `hash`
    /// under `leaderPubKey`, and that the key derives `leader`.
    ///
    /// Returns `false` on any decode failure.
    pub fn verify_leader_signature(&self) -> bool {
        let Some(vk) = crypto::public_key_from_b64(&self.leader_pub_key) else {
            return false;
        };
        if crypto::address_of(&vk) != self.leader {
            return false;
        }
        crypto::verify(&vk, self.hash.as_bytes(), &self.leader_signature)
    }

    /// Header projection served by `GET /headers`.
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            epoch: self.epoch,
            hash: self.hash,
            previous_hash: self.previous_hash,
            tx_root: self.tx_root,
            receipt_root: self.receipt_root,
            state_root: self.state_root,
            timestamp: self.timestamp,
            leader: self.leader,
            leader_signature: self.leader_signature.clone(),
        }
    }
}

/// Light header view of a block, enough for SPV-style consumers to chain
/// hashes and anchor Merkle proofs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub epoch: u64,
    pub hash: Hash256,
    pub previous_hash: Hash256,
    pub tx_root: Hash256,
    pub receipt_root: Hash256,
    pub state_root: Hash256,
    pub timestamp: u64,
    pub leader: Address,
    pub leader_signature: String,
}
