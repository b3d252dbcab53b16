//! Protocol message bodies.
//!
//! These are the JSON records exchanged between nodes. Field names are
//! camelCase on the wire; signatures and public keys are base64 except
//! where a field name says PEM. The shapes here are load-bearing: the
//! canonical hashes and signatures computed over them must agree across
//! implementations.

use serde::{Deserialize, Serialize};

use crate::consensus::EquivocationEvidence;
use crate::types::{Address, Hash256, Receipt};

/// `POST /announce` request: a node introducing itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceRequest {
    /// Human-readable node name (logging hint only).
    pub id: String,
    /// Publicly reachable base URL of the sender.
    pub url: String,
    /// PEM-encoded Ed25519 public key.
    pub public_key_pem: String,
    /// Lowercase hex SHA-256 of the DER public key; its 20-byte prefix
    /// is the sender's ledger address.
    pub public_key_hash: String,
}

/// Generic acknowledgement body.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    /// The affirmative acknowledgement.
    pub const OK: OkResponse = OkResponse { ok: true };
}

/// One entry of the `GET /peers` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub id: String,
    pub url: String,
    pub public_key_hash: String,
}

/// Peer entry carried inside gossip messages. Unlike [`PeerInfo`] it
/// includes the PEM key so recipients can verify signatures from peers
/// they learned second-hand.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GossipPeer {
    pub id: String,
    pub url: String,
    pub public_key_pem: String,
    pub public_key_hash: String,
}

/// `POST /challenge` response: the signed receipt plus the responder's
/// key for verification.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub receipt: Receipt,
    pub public_key_pem: String,
}

/// A vote over a proposed block's hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteMessage {
    pub epoch: u64,
    pub block_hash: Hash256,
    pub voter: Address,
    /// Base64 DER public key of the voter.
    pub voter_pub_key: String,
    /// Base64 signature over the block hash bytes.
    pub signature: String,
}

/// `POST /propose` response: a vote on acceptance, or a rejection that
/// may carry equivocation evidence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EquivocationEvidence>,
}

impl ProposeResponse {
    /// An accepting response carrying the follower's vote.
    pub fn accepted(vote: VoteMessage) -> Self {
        ProposeResponse {
            ok: true,
            vote: Some(vote),
            error: None,
            evidence: None,
        }
    }

    /// A rejection with a reason and optional evidence.
    pub fn rejected(error: String, evidence: Option<EquivocationEvidence>) -> Self {
        ProposeResponse {
            ok: false,
            vote: None,
            error: Some(error),
            evidence,
        }
    }
}

/// `POST /view-change` body: a follower asking to replace the leader.
///
/// The signature covers
/// [`crate::consensus::view_change_payload`]`(epoch, newView)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewChangeMessage {
    pub epoch: u64,
    pub old_view: u64,
    pub new_view: u64,
    pub from: Address,
    pub signature: String,
}

/// `POST /gossip` body: liveness beacon plus the sender's peer list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GossipMessage {
    pub from: Address,
    pub chain_length: u64,
    pub last_block_hash: Hash256,
    pub peers: Vec<GossipPeer>,
}
