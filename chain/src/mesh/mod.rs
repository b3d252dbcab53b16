//! Peer mesh: registry and transport.
//!
//! The registry exclusively owns the non-replicated peer map. Peers are
//! learned from `announce` and gossip, refreshed on every successful
//! exchange, and evicted when silent past the heartbeat timeout.
//! Transport lives in [`client::MeshClient`]; its failures are absorbed
//! by callers and never reach consensus state.

use std::collections::HashMap;

use ed25519_dalek::VerifyingKey;

use crate::crypto;
use crate::types::{Address, Hash256};

pub mod client;
pub mod messages;

pub use client::MeshClient;
pub use messages::{
    AnnounceRequest, ChallengeResponse, GossipMessage, GossipPeer, OkResponse, PeerInfo,
    ProposeResponse, ViewChangeMessage, VoteMessage,
};

/// Errors raised by the mesh layer.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// A peer could not be reached or answered garbage. Tolerated:
    /// affects peer liveness only.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    /// An announce or gossip entry carried inconsistent key material.
    #[error("invalid peer announcement: {0}")]
    InvalidPeer(String),
}

/// What the registry knows about one peer.
#[derive(Clone, Debug)]
pub struct PeerRecord {
    /// Display name (logging hint only).
    pub id: String,
    /// Base URL for protocol calls.
    pub url: String,
    /// PEM public key, used to verify the peer's signatures.
    pub public_key_pem: String,
    /// Hex SHA-256 of the DER public key.
    pub public_key_hash: String,
    /// Milliseconds-since-epoch of the last successful exchange.
    pub last_seen: u64,
    /// Last committed effectiveness score observed for this address.
    pub effectiveness: f64,
    /// Chain length the peer reported in its latest gossip.
    pub chain_length: u64,
    /// Head hash the peer reported in its latest gossip.
    pub last_block_hash: Option<Hash256>,
}

impl PeerRecord {
    /// Parses the stored PEM key. `None` if it no longer parses.
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        crypto::public_key_from_pem(&self.public_key_pem)
    }
}

/// Per-node in-memory peer map, keyed by ledger address.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<Address, PeerRecord>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or refreshes a peer from announce/gossip key material.
    ///
    /// The PEM key is authoritative: it must parse, and its SHA-256 must
    /// match the claimed `public_key_hash`. Returns the peer's address.
    pub fn register(
        &mut self,
        id: &str,
        url: &str,
        public_key_pem: &str,
        public_key_hash: &str,
        now_ms: u64,
    ) -> Result<Address, MeshError> {
        let vk = crypto::public_key_from_pem(public_key_pem)
            .ok_or_else(|| MeshError::InvalidPeer("unparsable public key PEM".to_string()))?;
        let der = crypto::public_key_der(&vk);
        let derived_hash = crypto::sha256(&der).to_hex();
        if derived_hash != public_key_hash {
            return Err(MeshError::InvalidPeer(
                "publicKeyHash does not match the PEM key".to_string(),
            ));
        }

        let address = Address::from_public_key_der(&der);
        let record = self.peers.entry(address).or_insert_with(|| PeerRecord {
            id: id.to_string(),
            url: url.to_string(),
            public_key_pem: public_key_pem.to_string(),
            public_key_hash: public_key_hash.to_string(),
            last_seen: now_ms,
            effectiveness: 0.0,
            chain_length: 0,
            last_block_hash: None,
        });
        record.id = id.to_string();
        record.url = url.to_string();
        record.last_seen = now_ms;
        Ok(address)
    }

    /// Refreshes `last_seen` after a successful exchange.
    pub fn touch(&mut self, addr: &Address, now_ms: u64) {
        if let Some(record) = self.peers.get_mut(addr) {
            record.last_seen = now_ms;
        }
    }

    /// Records the chain tip a peer reported via gossip.
    pub fn note_gossip(
        &mut self,
        addr: &Address,
        chain_length: u64,
        last_block_hash: Hash256,
        now_ms: u64,
    ) {
        if let Some(record) = self.peers.get_mut(addr) {
            record.chain_length = chain_length;
            record.last_block_hash = Some(last_block_hash);
            record.last_seen = now_ms;
        }
    }

    /// Updates the displayed effectiveness for an address.
    pub fn note_effectiveness(&mut self, addr: &Address, effectiveness: f64) {
        if let Some(record) = self.peers.get_mut(addr) {
            record.effectiveness = effectiveness;
        }
    }

    /// Removes peers whose `last_seen` is older than the heartbeat
    /// timeout. Returns the evicted addresses.
    pub fn evict_stale(&mut self, now_ms: u64, heartbeat_timeout_secs: u64) -> Vec<Address> {
        let cutoff = now_ms.saturating_sub(heartbeat_timeout_secs * 1_000);
        let stale: Vec<Address> = self
            .peers
            .iter()
            .filter(|(_, r)| r.last_seen < cutoff)
            .map(|(a, _)| *a)
            .collect();
        for addr in &stale {
            self.peers.remove(addr);
        }
        stale
    }

    /// Looks up one peer.
    pub fn get(&self, addr: &Address) -> Option<&PeerRecord> {
        self.peers.get(addr)
    }

    /// Known peer addresses, unordered.
    pub fn addresses(&self) -> Vec<Address> {
        self.peers.keys().copied().collect()
    }

    /// Iterates over `(address, record)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &PeerRecord)> {
        self.peers.iter()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` when no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// The validator set: self plus every known peer, sorted by address.
    /// Quorum and leader election both run over this list.
    pub fn validator_set(&self, self_addr: Address) -> Vec<Address> {
        let mut set: Vec<Address> = self.peers.keys().copied().collect();
        set.push(self_addr);
        set.sort();
        set.dedup();
        set
    }

    /// Resolves a peer's verifying key for signature checks.
    pub fn resolve_key(&self, addr: &Address) -> Option<VerifyingKey> {
        self.peers.get(addr).and_then(PeerRecord::verifying_key)
    }

    /// The gossip peer list this node shares: every known peer.
    pub fn gossip_peers(&self) -> Vec<GossipPeer> {
        self.peers
            .values()
            .map(|r| GossipPeer {
                id: r.id.clone(),
                url: r.url.clone(),
                public_key_pem: r.public_key_pem.clone(),
                public_key_hash: r.public_key_hash.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn announce(registry: &mut PeerRegistry, kp: &Keypair, name: &str, now_ms: u64) -> Address {
        registry
            .register(
                name,
                &format!("http://{name}.test:7000"),
                &kp.public_key_pem(),
                &kp.public_key_hash(),
                now_ms,
            )
            .expect("valid announcement")
    }

    #[test]
    fn register_derives_the_address_from_the_key() {
        let kp = Keypair::generate();
        let mut registry = PeerRegistry::new();
        let addr = announce(&mut registry, &kp, "n1", 1_000);
        assert_eq!(addr, kp.address());
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve_key(&addr).is_some());
    }

    #[test]
    fn mismatched_key_hash_is_rejected() {
        let kp = Keypair::generate();
        let other = Keypair::generate();
        let mut registry = PeerRegistry::new();
        let err = registry
            .register(
                "liar",
                "http://liar.test",
                &kp.public_key_pem(),
                &other.public_key_hash(),
                1_000,
            )
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidPeer(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_peers_are_evicted() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();
        let mut registry = PeerRegistry::new();
        let a1 = announce(&mut registry, &kp1, "n1", 0);
        let a2 = announce(&mut registry, &kp2, "n2", 0);

        // n2 stays fresh, n1 goes silent past the 60 s heartbeat.
        registry.touch(&a2, 70_000);
        let evicted = registry.evict_stale(70_000, 60);
        assert_eq!(evicted, vec![a1]);
        assert!(registry.get(&a2).is_some());
    }

    #[test]
    fn validator_set_is_sorted_and_includes_self() {
        let me = Keypair::generate();
        let peer = Keypair::generate();
        let mut registry = PeerRegistry::new();
        announce(&mut registry, &peer, "n1", 0);

        let set = registry.validator_set(me.address());
        assert_eq!(set.len(), 2);
        assert!(set.windows(2).all(|w| w[0] < w[1]));
        assert!(set.contains(&me.address()));
    }

    #[test]
    fn reannounce_updates_url_without_duplicating() {
        let kp = Keypair::generate();
        let mut registry = PeerRegistry::new();
        let addr = announce(&mut registry, &kp, "n1", 0);

        registry
            .register(
                "n1",
                "http://moved.test:7001",
                &kp.public_key_pem(),
                &kp.public_key_hash(),
                5_000,
            )
            .expect("re-announce");
        assert_eq!(registry.len(), 1);
        let record = registry.get(&addr).expect("still present");
        assert_eq!(record.url, "http://moved.test:7001");
        assert_eq!(record.last_seen, 5_000);
    }
}
