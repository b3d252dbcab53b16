//! HTTP transport client for peer-to-peer protocol calls.
//!
//! Every outbound exchange in the protocol goes through this client:
//! announcements, challenges, proposals, votes, commits, view changes,
//! gossip, and chain fetches. Calls carry the transport timeout (10 s by
//! default); challenges use their own shorter protocol deadline. Errors
//! are returned, not retried; callers treat them as liveness signals.

use std::time::Duration;

use reqwest::Client;

use crate::types::{Block, Challenge, Transaction};

use super::MeshError;
use super::messages::{
    AnnounceRequest, ChallengeResponse, GossipMessage, OkResponse, PeerInfo, ProposeResponse,
    ViewChangeMessage, VoteMessage,
};

/// Async protocol client, cheap to clone.
#[derive(Clone)]
pub struct MeshClient {
    http: Client,
    challenge_timeout: Duration,
}

impl MeshClient {
    /// Builds a client with the given transport and challenge deadlines.
    pub fn new(transport_timeout: Duration, challenge_timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(transport_timeout)
            .build()
            .expect("default TLS-free HTTP client always builds");
        MeshClient {
            http,
            challenge_timeout,
        }
    }

    fn endpoint(base_url: &str, path: &str) -> String {
        // Avoid accidental double slashes.
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// `POST /announce`: introduce ourselves to a peer.
    pub async fn announce(
        &self,
        base_url: &str,
        req: &AnnounceRequest,
    ) -> Result<OkResponse, MeshError> {
        let resp = self
            .http
            .post(Self::endpoint(base_url, "announce"))
            .json(req)
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `GET /peers`: the peer's view of the mesh.
    pub async fn fetch_peers(&self, base_url: &str) -> Result<Vec<PeerInfo>, MeshError> {
        let resp = self.http.get(Self::endpoint(base_url, "peers")).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `POST /challenge`: run the participation workload on a peer.
    ///
    /// Uses the protocol-level challenge deadline instead of the general
    /// transport timeout; a late receipt counts as absent.
    pub async fn challenge(
        &self,
        base_url: &str,
        challenge: &Challenge,
    ) -> Result<ChallengeResponse, MeshError> {
        let resp = self
            .http
            .post(Self::endpoint(base_url, "challenge"))
            .timeout(self.challenge_timeout)
            .json(challenge)
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `POST /propose`: synchronous proposal/vote exchange with one
    /// follower. Rejections come back in the body, not as HTTP errors.
    pub async fn propose(
        &self,
        base_url: &str,
        block: &Block,
    ) -> Result<ProposeResponse, MeshError> {
        let resp = self
            .http
            .post(Self::endpoint(base_url, "propose"))
            .json(block)
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `POST /vote`: deliver a vote out-of-band.
    pub async fn send_vote(
        &self,
        base_url: &str,
        vote: &VoteMessage,
    ) -> Result<OkResponse, MeshError> {
        let resp = self
            .http
            .post(Self::endpoint(base_url, "vote"))
            .json(vote)
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `POST /commit`: broadcast a committed block.
    pub async fn send_commit(&self, base_url: &str, block: &Block) -> Result<OkResponse, MeshError> {
        let resp = self
            .http
            .post(Self::endpoint(base_url, "commit"))
            .json(block)
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `POST /view-change`: ask a peer to move to the next view.
    pub async fn send_view_change(
        &self,
        base_url: &str,
        msg: &ViewChangeMessage,
    ) -> Result<OkResponse, MeshError> {
        let resp = self
            .http
            .post(Self::endpoint(base_url, "view-change"))
            .json(msg)
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `POST /transaction`: forward a transaction to a peer's pool.
    pub async fn submit_transaction(
        &self,
        base_url: &str,
        tx: &Transaction,
    ) -> Result<OkResponse, MeshError> {
        let resp = self
            .http
            .post(Self::endpoint(base_url, "transaction"))
            .json(tx)
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `POST /gossip`: liveness beacon plus peer list exchange.
    pub async fn gossip(
        &self,
        base_url: &str,
        msg: &GossipMessage,
    ) -> Result<OkResponse, MeshError> {
        let resp = self
            .http
            .post(Self::endpoint(base_url, "gossip"))
            .json(msg)
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// `GET /chain`: fetch the peer's recent blocks for catch-up.
    pub async fn fetch_chain(&self, base_url: &str) -> Result<Vec<Block>, MeshError> {
        let resp = self.http.get(Self::endpoint(base_url, "chain")).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }
}
