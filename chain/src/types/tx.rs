// chain/src/types/tx.rs

//! Value-transfer transaction types.
//!
//! A transaction moves integer token units between two ledger addresses.
//! The sentinel sender `"coinbase"` mints new units to the recipient and
//! is never debited; it carries the transaction timestamp as a per-mint
//! unique nonce and an unverifiable marker in place of a signature.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::{self, Keypair};

use super::{Address, Hash256};

/// Marker string used in the `from`, `signature`, and `publicKey` fields
/// of a minting transaction.
pub const COINBASE: &str = "coinbase";

/// Sender of a transaction: a real ledger address, or the coinbase
/// sentinel.
///
/// On the wire this is either the literal string `"coinbase"` or a
/// 40-character lowercase hex address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxSender {
    /// Minting sentinel; permitted only as `from`.
    Coinbase,
    /// A regular ledger address.
    Addr(Address),
}

impl TxSender {
    /// Returns the inner address, or `None` for coinbase.
    pub fn address(&self) -> Option<Address> {
        match self {
            TxSender::Coinbase => None,
            TxSender::Addr(a) => Some(*a),
        }
    }
}

impl fmt::Display for TxSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxSender::Coinbase => f.write_str(COINBASE),
            TxSender::Addr(a) => fmt::Display::fmt(a, f),
        }
    }
}

impl Serialize for TxSender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TxSender::Coinbase => serializer.serialize_str(COINBASE),
            TxSender::Addr(a) => a.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TxSender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SenderVisitor;

        impl Visitor<'_> for SenderVisitor {
            type Value = TxSender;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"coinbase\" or a hex-encoded address")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TxSender, E> {
                if v == COINBASE {
                    Ok(TxSender::Coinbase)
                } else {
                    v.parse().map(TxSender::Addr).map_err(E::custom)
                }
            }
        }

        deserializer.deserialize_str(SenderVisitor)
    }
}

/// A signed value transfer (or a coinbase mint).
///
/// The signature covers the canonical JSON of the transaction minus the
/// `signature` field, under the key carried in `publicKey`. The sender
/// address must equal the address derived from that key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Sending address, or the coinbase sentinel.
    pub from: TxSender,
    /// Receiving address.
    pub to: Address,
    /// Amount in integer token units.
    pub amount: u64,
    /// Anti-replay counter; must be exactly `sender nonce + 1` at the
    /// instant of inclusion. Coinbase mints carry their timestamp here.
    pub nonce: u64,
    /// Wall-clock creation time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Base64 Ed25519 signature, or the coinbase marker.
    pub signature: String,
    /// Base64 DER (SPKI) public key of the sender, or the coinbase marker.
    pub public_key: String,
}

impl Transaction {
    /// Builds a minting transaction crediting `to`.
    ///
    /// The nonce is the timestamp, which makes every mint unique without
    /// touching any account's nonce sequence.
    pub fn coinbase(to: Address, amount: u64, timestamp: u64) -> Self {
        Transaction {
            from: TxSender::Coinbase,
            to,
            amount,
            nonce: timestamp,
            timestamp,
            signature: COINBASE.to_string(),
            public_key: COINBASE.to_string(),
        }
    }

    /// Builds and signs a transfer from the key pair's address.
    pub fn signed(keypair: &Keypair, to: Address, amount: u64, nonce: u64, timestamp: u64) -> Self {
        let mut tx = Transaction {
            from: TxSender::Addr(keypair.address()),
            to,
            amount,
            nonce,
            timestamp,
            signature: String::new(),
            public_key: keypair.public_key_b64(),
        };
        let payload = crypto::canonical_json(&tx.signing_payload());
        tx.signature = keypair.sign(payload.as_bytes());
        tx
    }

    /// Returns `true` for minting transactions.
    pub fn is_coinbase(&self) -> bool {
        matches!(self.from, TxSender::Coinbase)
    }

    /// The JSON value that is signed: the transaction minus `signature`.
    pub fn signing_payload(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).expect("transaction is always serializable");
        if let serde_json::Value::Object(map) = &mut v {
            map.remove("signature");
        }
        v
    }

    /// Canonical content hash of the full transaction, as committed in
    /// the block's `txRoot` and queried via `/proof/{txHash}`.
    pub fn tx_hash(&self) -> Hash256 {
        crypto::hash_canonical(self)
    }

    /// Idempotency key used by the pending pool.
    ///
    /// Signed transactions deduplicate on their signature; coinbase mints
    /// share one marker string, so they fall back to the content hash.
    pub fn dedup_key(&self) -> String {
        if self.is_coinbase() {
            self.tx_hash().to_hex()
        } else {
            self.signature.clone()
        }
    }

    /// Verifies the sender signature.
    ///
    /// Coinbase mints are unverifiable by construction and always pass.
    /// For signed transfers this checks that the embedded public key
    /// derives the `from` address and that the signature verifies over
    /// the canonical signing payload. Any decode failure yields `false`.
    pub fn verify_signature(&self) -> bool {
        let from = match self.from {
            TxSender::Coinbase => return true,
            TxSender::Addr(a) => a,
        };
        let Some(vk) = crypto::public_key_from_b64(&self.public_key) else {
            return false;
        };
        if crypto::address_of(&vk) != from {
            return false;
        }
        let payload = crypto::canonical_json(&self.signing_payload());
        crypto::verify(&vk, payload.as_bytes(), &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ADDRESS_LEN;

    fn dummy_addr(byte: u8) -> Address {
        Address([byte; ADDRESS_LEN])
    }

    #[test]
    fn sender_serde_roundtrips_coinbase_and_address() {
        let cb = serde_json::to_string(&TxSender::Coinbase).expect("serialize coinbase");
        assert_eq!(cb, "\"coinbase\"");
        let back: TxSender = serde_json::from_str(&cb).expect("deserialize coinbase");
        assert_eq!(back, TxSender::Coinbase);

        let addr = TxSender::Addr(dummy_addr(3));
        let json = serde_json::to_string(&addr).expect("serialize address");
        let back: TxSender = serde_json::from_str(&json).expect("deserialize address");
        assert_eq!(back, addr);
    }

    #[test]
    fn coinbase_nonce_is_timestamp() {
        let tx = Transaction::coinbase(dummy_addr(1), 1000, 1_700_000_000_000);
        assert!(tx.is_coinbase());
        assert_eq!(tx.nonce, 1_700_000_000_000);
        assert_eq!(tx.signature, COINBASE);
        assert!(tx.verify_signature());
    }

    #[test]
    fn signed_transfer_verifies_and_tampered_amount_does_not() {
        let kp = Keypair::generate();
        let tx = Transaction::signed(&kp, dummy_addr(9), 100, 1, 1_700_000_000_000);
        assert!(tx.verify_signature());

        let mut forged = tx.clone();
        forged.amount = 200;
        assert!(!forged.verify_signature());
    }

    #[test]
    fn signature_under_foreign_key_is_rejected() {
        let kp = Keypair::generate();
        let other = Keypair::generate();
        let mut tx = Transaction::signed(&kp, dummy_addr(9), 100, 1, 1);
        // Swap in a key that does not derive the sender address.
        tx.public_key = other.public_key_b64();
        assert!(!tx.verify_signature());
    }

    #[test]
    fn signing_payload_omits_signature_only() {
        let kp = Keypair::generate();
        let tx = Transaction::signed(&kp, dummy_addr(2), 5, 1, 7);
        let payload = tx.signing_payload();
        let obj = payload.as_object().expect("payload is an object");
        assert!(!obj.contains_key("signature"));
        assert!(obj.contains_key("publicKey"));
        assert!(obj.contains_key("from"));
    }

    #[test]
    fn dedup_key_distinguishes_coinbase_mints() {
        let a = Transaction::coinbase(dummy_addr(1), 10, 1_000);
        let b = Transaction::coinbase(dummy_addr(1), 10, 2_000);
        assert_eq!(a.signature, b.signature);
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
