//! Core domain types used by the chain.
//!
//! This module defines strongly-typed hashes, ledger addresses, accounts,
//! and the wire records (transactions, receipts, blocks) that are shared
//! across the chain implementation. The goal is to avoid "naked" strings
//! and byte buffers in public APIs and instead use domain-specific
//! newtypes that serialize to the exact wire form.
//!
//! Serialization is JSON throughout: hashes and addresses are lowercase
//! hex strings, signatures and public keys are base64. The canonical form
//! used for hashing and signing is key-sorted compact JSON, produced by
//! [`crate::crypto::canonical_json`].

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Block types and canonical block hashing.
pub mod block;
/// Challenge/receipt types for the participation protocol.
pub mod receipt;
/// Value-transfer transaction types.
pub mod tx;

pub use block::{Block, BlockHeader};
pub use receipt::{Challenge, Receipt};
pub use tx::{Transaction, TxSender};

/// Length in bytes of all 256-bit hash values used by the chain.
pub const HASH_LEN: usize = 32;

/// Length in bytes of a ledger address.
pub const ADDRESS_LEN: usize = 20;

/// Strongly-typed 256-bit hash wrapper (SHA-256).
///
/// This type backs every fixed-size digest in the chain: block hashes,
/// transaction hashes, Merkle roots, and Merkle proof nodes. On the wire
/// it is a 64-character lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// The all-zero digest. Used as the `previousHash` of the genesis
    /// block and as the Merkle root of an empty leaf sequence.
    pub const ZERO: Hash256 = Hash256([0u8; HASH_LEN]);

    /// Returns the underlying 32-byte digest as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Returns the lowercase hex encoding of this digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns `true` if this is the all-zero digest.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| ParseError::BadHex)?;
        if bytes.len() != HASH_LEN {
            return Err(ParseError::BadLength {
                expected: HASH_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Hash256(arr))
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexVisitor;

        impl Visitor<'_> for HexVisitor {
            type Value = Hash256;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64-character lowercase hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Hash256, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

/// Ledger address: the first 20 bytes of SHA-256 over the DER-encoded
/// public key of a node's signing key.
///
/// Addresses are the only entity identifier inside the ledger; node names
/// are an out-of-band hint used only for logging. On the wire an address
/// is a 40-character lowercase hex string, which also makes it usable as
/// a JSON map key for vote and reward maps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Derives an address from a DER-encoded (SPKI) public key.
    pub fn from_public_key_der(der: &[u8]) -> Self {
        let digest = crate::crypto::sha256(der);
        let mut arr = [0u8; ADDRESS_LEN];
        arr.copy_from_slice(&digest.as_bytes()[..ADDRESS_LEN]);
        Address(arr)
    }

    /// Returns the underlying 20 bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Returns the lowercase hex encoding of this address.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| ParseError::BadHex)?;
        if bytes.len() != ADDRESS_LEN {
            return Err(ParseError::BadLength {
                expected: ADDRESS_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ADDRESS_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Address(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddrVisitor;

        impl Visitor<'_> for AddrVisitor {
            type Value = Address;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 40-character lowercase hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Address, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(AddrVisitor)
    }
}

/// Ledger account state.
///
/// Accounts are created lazily on first credit; a missing account reads
/// as the default `(balance: 0, nonce: 0)`. The nonce of the next accepted
/// transaction from an address is exactly `nonce + 1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Non-negative balance in integer token units.
    pub balance: u64,
    /// Monotonically increasing transaction counter.
    pub nonce: u64,
}

/// Errors raised while parsing wire-encoded identifiers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// The string was not valid hex.
    #[error("invalid hex encoding")]
    BadHex,
    /// The decoded byte length did not match the expected width.
    #[error("expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },
}
