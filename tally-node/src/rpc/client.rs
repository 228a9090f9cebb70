use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use tally_common::{
    env::vote_data::{CommitNotice, VoteRequest, VoteResponse},
    error::{Result, TallyError},
};
use tally_consensus::{PeerTransport, ResolvedPeer};

/// JSON-over-HTTP calls to the other nodes' `/consensus/*` and `/health` routes.
///
/// The client-level timeout is a backstop; the coordinator enforces the
/// round deadline and the health tracker its probe timeout.
#[derive(Clone)]
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TallyError::Config(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    fn url(peer: &ResolvedPeer, path: &str) -> String {
        format!("{}{}", peer.endpoint.trim_end_matches('/'), path)
    }

    fn unreachable(peer: &ResolvedPeer, e: impl std::fmt::Display) -> TallyError {
        TallyError::PeerUnreachable { peer: peer.id.to_string(), reason: e.to_string() }
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn request_vote(&self, peer: &ResolvedPeer, request: &VoteRequest) -> Result<VoteResponse> {
        let url = Self::url(peer, "/consensus/vote");
        debug!("📡 POST {} ({})", url, request.operation_id);

        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;

        if !resp.status().is_success() {
            return Err(Self::unreachable(peer, format!("HTTP {}", resp.status())));
        }
        let body = resp.bytes().await.map_err(|e| Self::unreachable(peer, e))?;
        // corpo ilegível vira Serialization, que o coordenador trata como voto inválido
        Ok(serde_json::from_slice::<VoteResponse>(&body)?)
    }

    async fn send_commit(&self, peer: &ResolvedPeer, notice: &CommitNotice) -> Result<()> {
        let url = Self::url(peer, "/consensus/commit");
        let resp = self
            .client
            .post(&url)
            .json(notice)
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(TallyError::Other(format!("commit refused by {}: HTTP {} {}", peer.id, status, text)))
        }
    }

    async fn probe(&self, peer: &ResolvedPeer) -> Result<()> {
        let resp = self
            .client
            .get(Self::url(peer, "/health"))
            .send()
            .await
            .map_err(|e| Self::unreachable(peer, e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::unreachable(peer, format!("HTTP {}", resp.status())))
        }
    }
}
