//! Cryptographic primitives: Ed25519 signatures, SHA-256 hashing,
//! canonical JSON, and address derivation.
//!
//! Every structural hash in the system goes through [`hash_canonical`]:
//! the value is serialized to canonical JSON (object keys sorted
//! lexicographically, no insignificant whitespace, numbers in their
//! shortest decimal form, strings UTF-8) and the bytes are hashed with
//! SHA-256. Implementations on other stacks must agree byte-for-byte,
//! so signatures remain portable.
//!
//! Verification never fails loudly: [`verify`] returns `false` on any
//! decode or parse error instead of propagating it, so a malformed
//! signature can never take down a message handler.

use std::fs;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::{Address, Hash256};

/// File name of the PEM-encoded public key inside a node's data dir.
pub const PUBLIC_KEY_FILE: &str = "keypair.pub";
/// File name of the PEM-encoded private key inside a node's data dir.
pub const PRIVATE_KEY_FILE: &str = "keypair.priv";

/// Errors raised by key management.
///
/// Signature *verification* never returns these; only key generation,
/// persistence, and loading do.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// A node's long-lived Ed25519 signing identity.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        Keypair {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Loads the key pair from `dir` if present, otherwise generates one
    /// and persists it as `keypair.priv` / `keypair.pub` PEM files.
    pub fn load_or_generate(dir: &Path) -> Result<Self, CryptoError> {
        let priv_path = dir.join(PRIVATE_KEY_FILE);
        if priv_path.exists() {
            let pem = fs::read_to_string(&priv_path)?;
            let signing = SigningKey::from_pkcs8_pem(&pem)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            return Ok(Keypair { signing });
        }

        let kp = Keypair::generate();
        kp.save(dir)?;
        Ok(kp)
    }

    /// Writes both PEM files into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), CryptoError> {
        fs::create_dir_all(dir)?;
        let priv_pem = self
            .signing
            .to_pkcs8_pem(Default::default())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        fs::write(dir.join(PRIVATE_KEY_FILE), priv_pem.as_bytes())?;
        fs::write(dir.join(PUBLIC_KEY_FILE), self.public_key_pem())?;
        Ok(())
    }

    /// Returns the verifying half of the key pair.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Signs `message` and returns the signature as base64.
    pub fn sign(&self, message: &[u8]) -> String {
        BASE64.encode(self.signing.sign(message).to_bytes())
    }

    /// DER (SPKI) encoding of the public key; the input to address
    /// derivation.
    pub fn public_key_der(&self) -> Vec<u8> {
        public_key_der(&self.verifying_key())
    }

    /// Base64 of the DER public key, the wire form carried in blocks,
    /// votes, and transactions.
    pub fn public_key_b64(&self) -> String {
        BASE64.encode(self.public_key_der())
    }

    /// PEM encoding of the public key, the wire form carried in
    /// `announce` and challenge responses.
    pub fn public_key_pem(&self) -> String {
        self.verifying_key()
            .to_public_key_pem(Default::default())
            .expect("ed25519 public key is always PEM-encodable")
    }

    /// Full SHA-256 of the DER public key, lowercase hex.
    pub fn public_key_hash(&self) -> String {
        sha256(&self.public_key_der()).to_hex()
    }

    /// Ledger address of this identity.
    pub fn address(&self) -> Address {
        Address::from_public_key_der(&self.public_key_der())
    }
}

/// SHA-256 over raw bytes.
pub fn sha256(bytes: &[u8]) -> Hash256 {
    let digest = Sha256::digest(bytes);
    Hash256(digest.into())
}

/// Serializes a value to canonical JSON: keys sorted, compact.
///
/// `serde_json::Value` objects are backed by a `BTreeMap`, so routing the
/// value through `to_value` yields lexicographically sorted keys, and
/// `to_string` emits no insignificant whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .expect("canonical values are always serializable")
        .to_string()
}

/// SHA-256 over the canonical JSON of a value. The structural hash used
/// for block hashes, transaction hashes, Merkle leaves, and signatures.
pub fn hash_canonical<T: Serialize>(value: &T) -> Hash256 {
    sha256(canonical_json(value).as_bytes())
}

/// DER (SPKI) encoding of a verifying key.
pub fn public_key_der(vk: &VerifyingKey) -> Vec<u8> {
    vk.to_public_key_der()
        .expect("ed25519 public key is always DER-encodable")
        .as_bytes()
        .to_vec()
}

/// Ledger address of a verifying key.
pub fn address_of(vk: &VerifyingKey) -> Address {
    Address::from_public_key_der(&public_key_der(vk))
}

/// Parses a base64 DER (SPKI) public key. `None` on any decode failure.
pub fn public_key_from_b64(b64: &str) -> Option<VerifyingKey> {
    let der = BASE64.decode(b64).ok()?;
    VerifyingKey::from_public_key_der(&der).ok()
}

/// Parses a PEM public key. `None` on any decode failure.
pub fn public_key_from_pem(pem: &str) -> Option<VerifyingKey> {
    VerifyingKey::from_public_key_pem(pem).ok()
}

/// Verifies a base64 signature over `message` under `vk`.
///
/// Returns `false` on malformed base64 or a wrong-length signature
/// rather than erroring; dalek's verification itself runs in constant
/// time.
pub fn verify(vk: &VerifyingKey, message: &[u8], signature_b64: &str) -> bool {
    let Ok(bytes) = BASE64.decode(signature_b64) else {
        return false;
    };
    let Ok(sig) = ed25519_dalek::Signature::from_slice(&bytes) else {
        return false;
    };
    vk.verify(message, &sig).is_ok()
}
