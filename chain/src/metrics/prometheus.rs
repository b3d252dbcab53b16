//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed consensus counters, and an
//! async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};

/// Consensus-related Prometheus metrics.
///
/// Every counter that affects commit progress lives here, so operators
/// can watch view-change storms and slashing from the exporter while the
/// `/health` endpoint mirrors the same numbers as JSON.
#[derive(Clone)]
pub struct ConsensusMetrics {
    /// View changes this node has participated in.
    pub view_changes: IntCounter,
    /// Equivocation slashes applied by this observer.
    pub slash_events: IntCounter,
    /// Blocks this node assembled and proposed as leader.
    pub blocks_produced: IntCounter,
    /// Blocks appended to the local chain (own or remote).
    pub blocks_committed: IntCounter,
    /// Challenges issued to peers.
    pub challenges_sent: IntCounter,
    /// Challenges served for peers.
    pub challenges_received: IntCounter,
    /// Receipts that passed signature verification.
    pub receipts_verified: IntCounter,
    /// Latency of block assembly when leading, in seconds.
    pub block_build_seconds: Histogram,
    /// Latency of full proposal validation when following, in seconds.
    pub proposal_validation_seconds: Histogram,
}

impl ConsensusMetrics {
    /// Registers consensus metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let view_changes = IntCounter::with_opts(Opts::new(
            "consensus_view_changes_total",
            "Total number of view changes this node joined",
        ))?;
        registry.register(Box::new(view_changes.clone()))?;

        let slash_events = IntCounter::with_opts(Opts::new(
            "consensus_slash_events_total",
            "Total number of equivocation slashes applied locally",
        ))?;
        registry.register(Box::new(slash_events.clone()))?;

        let blocks_produced = IntCounter::with_opts(Opts::new(
            "consensus_blocks_produced_total",
            "Total number of blocks proposed by this node as leader",
        ))?;
        registry.register(Box::new(blocks_produced.clone()))?;

        let blocks_committed = IntCounter::with_opts(Opts::new(
            "consensus_blocks_committed_total",
            "Total number of blocks appended to the local chain",
        ))?;
        registry.register(Box::new(blocks_committed.clone()))?;

        let challenges_sent = IntCounter::with_opts(Opts::new(
            "receipts_challenges_sent_total",
            "Total number of participation challenges issued to peers",
        ))?;
        registry.register(Box::new(challenges_sent.clone()))?;

        let challenges_received = IntCounter::with_opts(Opts::new(
            "receipts_challenges_received_total",
            "Total number of participation challenges served",
        ))?;
        registry.register(Box::new(challenges_received.clone()))?;

        let receipts_verified = IntCounter::with_opts(Opts::new(
            "receipts_verified_total",
            "Total number of receipts that passed signature verification",
        ))?;
        registry.register(Box::new(receipts_verified.clone()))?;

        let block_build_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_block_build_seconds",
                "Time to assemble and sign a block when leading, in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(block_build_seconds.clone()))?;

        let proposal_validation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_proposal_validation_seconds",
                "Time to validate an incoming proposal, in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(proposal_validation_seconds.clone()))?;

        Ok(Self {
            view_changes,
            slash_events,
            blocks_produced,
            blocks_committed,
            challenges_sent,
            challenges_received,
            receipts_verified,
            block_build_seconds,
            proposal_validation_seconds,
        })
    }
}

/// Wrapper around a Prometheus registry and the consensus metrics.
///
/// This is the main handle you pass around in the node. It can be
/// wrapped in an [`Arc`] and shared across tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub consensus: ConsensusMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying
    /// `Registry` and registers the consensus metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("node".to_string()), None)?;
        let consensus = ConsensusMetrics::register(&registry)?;
        Ok(Self {
            registry,
            consensus,
        })
    }

    /// Encodes all metrics in this registry into the Prometheus text
    /// format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404. Spawn
/// it onto the Tokio runtime next to the protocol listener.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!("prometheus HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .expect("static response parts are valid"))
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .expect("static response parts are valid")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consensus_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = ConsensusMetrics::register(&registry).expect("register metrics");

        metrics.view_changes.inc();
        metrics.slash_events.inc();
        metrics.blocks_produced.inc();
        metrics.blocks_committed.inc();
        metrics.block_build_seconds.observe(0.01);

        assert_eq!(metrics.view_changes.get(), 1);
        assert_eq!(metrics.blocks_committed.get(), 1);
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn gather_text_contains_counter_names() {
        let metrics = MetricsRegistry::new().expect("registry");
        metrics.consensus.blocks_committed.inc();
        let text = metrics.gather_text();
        assert!(text.contains("consensus_blocks_committed_total"));
        assert!(text.contains("receipts_verified_total"));
    }
}
