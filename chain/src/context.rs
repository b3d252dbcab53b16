//! Per-node identity and configuration bundle.
//!
//! A [`NodeContext`] is created once at startup and passed explicitly
//! into every component that needs the node's identity or tuning. It
//! replaces any notion of process-global state: key material, derived
//! identifiers, and configuration all travel together.

use crate::config::NodeConfig;
use crate::crypto::Keypair;
use crate::types::Address;

/// Immutable identity + configuration of a running node.
pub struct NodeContext {
    /// Display name (logging and diagnostics only; never an identity).
    pub name: String,
    /// Publicly reachable base URL peers use to call us.
    pub public_url: String,
    /// Long-lived signing identity.
    pub keypair: Keypair,
    /// Ledger address derived from the key pair.
    pub address: Address,
    /// Base64 DER public key, cached for block/vote assembly.
    pub public_key_b64: String,
    /// PEM public key, cached for announce/challenge responses.
    pub public_key_pem: String,
    /// Hex SHA-256 of the DER public key.
    pub public_key_hash: String,
    /// Node tuning.
    pub config: NodeConfig,
}

impl NodeContext {
    /// Builds a context from a loaded key pair.
    pub fn new(name: String, public_url: String, keypair: Keypair, config: NodeConfig) -> Self {
        let address = keypair.address();
        let public_key_b64 = keypair.public_key_b64();
        let public_key_pem = keypair.public_key_pem();
        let public_key_hash = keypair.public_key_hash();
        NodeContext {
            name,
            public_url,
            keypair,
            address,
            public_key_b64,
            public_key_pem,
            public_key_hash,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_identifiers_are_consistent() {
        let ctx = NodeContext::new(
            "n1".to_string(),
            "http://127.0.0.1:7001".to_string(),
            Keypair::generate(),
            NodeConfig::default(),
        );
        assert_eq!(ctx.address, ctx.keypair.address());
        assert!(ctx.public_key_hash.starts_with(&ctx.address.to_hex()));
        assert!(ctx.public_key_pem.contains("PUBLIC KEY"));
    }
}
