//! Top-level configuration for a node.
//!
//! This module aggregates configuration for:
//!
//! - consensus parameters (`ConsensusConfig`),
//! - participation receipts (`ReceiptConfig`),
//! - mesh transport and gossip (`MeshConfig`),
//! - metrics exporter (enable flag + listen address),
//! - the per-node data directory.
//!
//! The goal is a single `NodeConfig` value the daemon constructs at
//! startup and threads explicitly into every component; there are no
//! process-wide singletons.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::consensus::ConsensusConfig;
use crate::receipts::ReceiptConfig;

/// Configuration for mesh transport and peer lifecycle.
#[derive(Clone, Debug)]
pub struct MeshConfig {
    /// How often the gossip loop touches every peer, in seconds.
    pub gossip_interval_secs: u64,
    /// Peers silent for longer than this are evicted, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Timeout on every outbound protocol call, in seconds.
    pub transport_timeout_secs: u64,
    /// Probability per gossip round of pulling a longer peer chain.
    pub chain_pull_probability: f64,
}

impl MeshConfig {
    /// Transport timeout as a [`Duration`].
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            gossip_interval_secs: 3,
            heartbeat_timeout_secs: 60,
            transport_timeout_secs: 10,
            chain_pull_probability: 0.1,
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for a node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub consensus: ConsensusConfig,
    pub receipts: ReceiptConfig,
    pub mesh: MeshConfig,
    pub metrics: MetricsConfig,
    /// Per-node data directory holding the PEM key pair, `chain.json`,
    /// and `accounts.json`.
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            consensus: ConsensusConfig::default(),
            receipts: ReceiptConfig::default(),
            mesh: MeshConfig::default(),
            metrics: MetricsConfig::default(),
            data_dir: PathBuf::from("nodes/node"),
        }
    }
}

impl NodeConfig {
    /// Config for a named node: data under `nodes/<name>`, metrics on a
    /// port derived from the protocol port so several nodes can share a
    /// host.
    pub fn for_node(name: &str, port: u16) -> Self {
        let mut cfg = NodeConfig::default();
        cfg.data_dir = PathBuf::from("nodes").join(name);
        cfg.metrics.listen_addr = SocketAddr::from(([127, 0, 0, 1], port.wrapping_add(1000)));
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.consensus.epoch_duration_secs, 10);
        assert_eq!(cfg.consensus.view_change_timeout_secs, 8);
        assert_eq!(cfg.consensus.reward_per_epoch, 100);
        assert_eq!(cfg.consensus.slash_amount, 500);
        assert_eq!(cfg.receipts.challenges_per_epoch, 2);
        assert_eq!(cfg.receipts.challenge_timeout_secs, 4);
        assert_eq!(cfg.mesh.gossip_interval_secs, 3);
        assert_eq!(cfg.mesh.heartbeat_timeout_secs, 60);
        assert_eq!(cfg.mesh.transport_timeout_secs, 10);
    }

    #[test]
    fn for_node_isolates_data_and_metrics() {
        let cfg = NodeConfig::for_node("n1", 7001);
        assert_eq!(cfg.data_dir, PathBuf::from("nodes/n1"));
        assert_eq!(cfg.metrics.listen_addr.port(), 8001);
    }
}
