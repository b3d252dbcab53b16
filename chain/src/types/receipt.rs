//! Challenge/receipt types for the participation protocol.
//!
//! Each epoch, every node challenges a handful of peers. The responder
//! runs a fixed pseudo-random workload, wraps the result in a [`Receipt`],
//! signs it, and returns it. Verified receipts feed the responder's
//! effectiveness score for the next epoch.

use serde::{Deserialize, Serialize};

use crate::crypto;

use super::Address;

/// A challenge issued to a peer at the start of an epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Unique identifier, echoed back in the receipt.
    pub challenge_id: String,
    /// Challenger address.
    pub from: Address,
    /// Responder address.
    pub to: Address,
    /// Epoch the challenge belongs to.
    pub epoch: u64,
}

/// A signed attestation that a challenge was completed.
///
/// The signature verifies under the responder's public key over the
/// canonical JSON of all other fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Identifier of the challenge being answered.
    pub challenge_id: String,
    /// Challenger address.
    pub from: Address,
    /// Responder address (the signer).
    pub to: Address,
    /// Epoch of the originating challenge.
    pub epoch: u64,
    /// Whether the workload completed.
    pub success: bool,
    /// Responder-measured processing time in milliseconds.
    pub latency_ms: u64,
    /// Responder wall-clock time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Output of the fixed workload function.
    pub work_result: u64,
    /// Base64 Ed25519 signature by the responder.
    pub signature: String,
}

impl Receipt {
    /// The JSON value the responder signs: the receipt minus `signature`.
    pub fn signing_payload(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).expect("receipt is always serializable");
        if let serde_json::Value::Object(map) = &mut v {
            map.remove("signature");
        }
        v
    }

    /// Verifies the responder signature under `responder_key`.
    pub fn verify(&self, responder_key: &ed25519_dalek::VerifyingKey) -> bool {
        let payload = crypto::canonical_json(&self.signing_payload());
        crypto::verify(responder_key, payload.as_bytes(), &self.signature)
    }

    /// Structural check used during proposal validation: a receipt must
    /// carry a challenge id, both endpoints, and a signature.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.challenge_id.is_empty() {
            return Some("challengeId");
        }
        if self.signature.is_empty() {
            return Some("signature");
        }
        None
    }
}
