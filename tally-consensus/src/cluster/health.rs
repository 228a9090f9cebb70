use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tally_common::utils::{time, NodeId};

use crate::{
    cluster::view::{ClusterView, ResolvedPeer},
    ports::{EndpointResolver, PeerTransport},
    telemetry,
};

/// Upper bound for a single health probe.
pub const MAX_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerHealth {
    Healthy,
    Unreachable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub id: NodeId,
    pub endpoint: String,
    pub healthy: bool,
    pub last_checked: DateTime<Utc>,
}

/// Cluster health as reported by `GET /consensus/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub node_id: NodeId,
    pub cluster_size: usize,
    pub healthy_nodes: usize,
    pub quorum_size: usize,
    pub quorum_available: bool,
    pub degraded_auth: bool,
    pub byzantine_events: u64,
    pub nodes: Vec<NodeHealth>,
}

/// Probes peers and keeps the last known state of each one.
///
/// Health is informational: proposals are always broadcast to every member
/// regardless of what the tracker last saw.
pub struct HealthTracker {
    view: Arc<ClusterView>,
    transport: Arc<dyn PeerTransport>,
    resolver: Arc<dyn EndpointResolver>,
    timeout: Duration,
    degraded_auth: bool,
}

impl HealthTracker {
    pub fn new(
        view: Arc<ClusterView>,
        transport: Arc<dyn PeerTransport>,
        resolver: Arc<dyn EndpointResolver>,
        timeout: Duration,
        degraded_auth: bool,
    ) -> Self {
        Self {
            view,
            transport,
            resolver,
            timeout: timeout.min(MAX_HEALTH_TIMEOUT),
            degraded_auth,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probes one peer. The local node is healthy by definition.
    pub async fn check_peer(&self, peer: &ResolvedPeer) -> PeerHealth {
        if &peer.id == self.view.local_id() {
            return PeerHealth::Healthy;
        }
        match tokio::time::timeout(self.timeout, self.transport.probe(peer)).await {
            Ok(Ok(())) => PeerHealth::Healthy,
            Ok(Err(e)) => {
                debug!("💔 Peer [{}] health probe failed: {}", peer.id, e);
                PeerHealth::Unreachable
            }
            Err(_) => {
                debug!("⏱️ Peer [{}] health probe timed out", peer.id);
                PeerHealth::Unreachable
            }
        }
    }

    /// Probes every member concurrently and returns a fresh snapshot.
    ///
    /// Address lookup gets the same bound as a probe; past it the configured
    /// endpoints are used. `byzantine_events` is owned by the coordinator and
    /// copied in as given.
    pub async fn cluster_status(&self, byzantine_events: u64) -> ClusterStatus {
        let peers = match tokio::time::timeout(self.timeout, self.view.resolve_round(self.resolver.as_ref())).await {
            Ok(peers) => peers,
            Err(_) => {
                warn!("⚠️ Resolução de endereços excedeu {:?}, usando endpoints configurados", self.timeout);
                self.view.configured_round()
            }
        };
        let probes = peers.iter().map(|p| async move { (p, self.check_peer(p).await) });
        let results = join_all(probes).await;

        let checked_at = time::now();
        let nodes: Vec<NodeHealth> = results
            .into_iter()
            .map(|(peer, health)| NodeHealth {
                id: peer.id.clone(),
                endpoint: peer.endpoint.clone(),
                healthy: health == PeerHealth::Healthy,
                last_checked: checked_at,
            })
            .collect();

        let healthy_nodes = nodes.iter().filter(|n| n.healthy).count();
        let quorum_available = healthy_nodes >= self.view.quorum_size();
        telemetry::cluster_health(healthy_nodes, quorum_available);

        ClusterStatus {
            node_id: self.view.local_id().clone(),
            cluster_size: self.view.size(),
            healthy_nodes,
            quorum_size: self.view.quorum_size(),
            quorum_available,
            degraded_auth: self.degraded_auth,
            byzantine_events,
            nodes,
        }
    }

    /// Periodic background probing, logging only transitions.
    pub fn spawn_poller(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut previous: HashMap<NodeId, bool> = HashMap::new();
            loop {
                ticker.tick().await;
                let status = self.cluster_status(0).await;
                for node in &status.nodes {
                    let was = previous.insert(node.id.clone(), node.healthy);
                    match (was, node.healthy) {
                        (Some(false), true) => info!("💚 Peer [{}] voltou a responder", node.id),
                        (Some(true), false) | (None, false) => {
                            warn!("💔 Peer [{}] indisponível em {}", node.id, node.endpoint)
                        }
                        _ => {}
                    }
                }
                if !status.quorum_available {
                    warn!(
                        "⚠️ Quorum indisponível: {}/{} nós saudáveis (mínimo {})",
                        status.healthy_nodes, status.cluster_size, status.quorum_size
                    );
                }
            }
        })
    }
}
