use std::collections::HashSet;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tally_common::{
    env::operation::OperationKind,
    error::{Result, TallyError},
    utils::NodeId,
};

use crate::{consensus::evaluator::DecisionRule, ports::EndpointResolver};

/// A configured cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: NodeId,
    pub endpoint: String,
}

/// A member with the address resolved for one proposal round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPeer {
    pub id: NodeId,
    pub endpoint: String,
}

/// Static peer directory plus the thresholds derived from its size.
///
/// The quorum is fixed when the view is built; there is no reconfiguration step.
#[derive(Debug, Clone)]
pub struct ClusterView {
    local: NodeId,
    members: Vec<Peer>,
    quorum_size: usize,
}

impl ClusterView {
    /// `members` must list every node, the local one included.
    pub fn new(local: NodeId, members: Vec<Peer>) -> Result<Self> {
        if members.is_empty() {
            return Err(TallyError::Config("cluster has no members".into()));
        }
        let mut seen = HashSet::new();
        for m in &members {
            if !seen.insert(m.id.clone()) {
                return Err(TallyError::Config(format!("duplicate member id {}", m.id)));
            }
        }
        if !seen.contains(&local) {
            return Err(TallyError::Config(format!("local node {local} is not a cluster member")));
        }

        let quorum_size = majority(members.len());
        Ok(Self { local, members, quorum_size })
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local
    }

    pub fn members(&self) -> &[Peer] {
        &self.members
    }

    pub fn member(&self, id: &NodeId) -> Option<&Peer> {
        self.members.iter().find(|m| &m.id == id)
    }

    pub fn is_member(&self, id: &NodeId) -> bool {
        self.member(id).is_some()
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn quorum_size(&self) -> usize {
        self.quorum_size
    }

    pub fn unanimity_size(&self) -> usize {
        self.members.len()
    }

    /// Approvals needed to commit an operation of `kind`, and the rule that sets it.
    pub fn required_approvals(&self, kind: OperationKind) -> (usize, DecisionRule) {
        if kind.requires_unanimity() {
            (self.unanimity_size(), DecisionRule::Unanimity)
        } else {
            (self.quorum_size, DecisionRule::Quorum)
        }
    }

    /// Members at their configured endpoints, skipping the resolver.
    pub fn configured_round(&self) -> Vec<ResolvedPeer> {
        self.members
            .iter()
            .map(|m| ResolvedPeer { id: m.id.clone(), endpoint: m.endpoint.clone() })
            .collect()
    }

    /// Resolves every member's address once for a round.
    ///
    /// A member the resolver cannot place keeps its configured endpoint.
    pub async fn resolve_round(&self, resolver: &dyn EndpointResolver) -> Vec<ResolvedPeer> {
        let lookups = self.members.iter().map(|m| async move {
            let endpoint = match resolver.resolve(m).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!("⚠️ Could not resolve [{}], using configured {}: {}", m.id, m.endpoint, e);
                    m.endpoint.clone()
                }
            };
            ResolvedPeer { id: m.id.clone(), endpoint }
        });
        join_all(lookups).await
    }
}

/// `floor(n/2) + 1`
pub fn majority(n: usize) -> usize {
    n / 2 + 1
}
