use async_trait::async_trait;

use tally_common::{
    env::vote_data::{CommitNotice, VoteRequest, VoteResponse},
    error::Result,
};

use crate::cluster::view::{Peer, ResolvedPeer};

/// Outbound peer-to-peer calls made by the coordinator and the health tracker.
///
/// Implementations return [`tally_common::TallyError::Serialization`] when a
/// peer answered with something that cannot be parsed, and
/// [`tally_common::TallyError::PeerUnreachable`] for timeouts and transport errors.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn request_vote(&self, peer: &ResolvedPeer, request: &VoteRequest) -> Result<VoteResponse>;

    async fn send_commit(&self, peer: &ResolvedPeer, notice: &CommitNotice) -> Result<()>;

    /// Liveness probe (`GET /health`).
    async fn probe(&self, peer: &ResolvedPeer) -> Result<()>;
}

/// Maps a peer's logical id to the address to use for the current round.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve(&self, peer: &Peer) -> Result<String>;
}

/// Uses the endpoints written in the cluster configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver;

#[async_trait]
impl EndpointResolver for StaticResolver {
    async fn resolve(&self, peer: &Peer) -> Result<String> {
        Ok(peer.endpoint.clone())
    }
}
