use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};
use tracing::info;

use tally_common::{
    env::{operation::OperationKind, vote_data::VoteRecord},
    utils::NodeId,
};

use crate::cluster::view::ClusterView;

/// Which threshold applied to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionRule {
    Quorum,
    Unanimity,
}

impl fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionRule::Quorum => write!(f, "quorum"),
            DecisionRule::Unanimity => write!(f, "unanimity"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub committed: bool,
    pub approvals: usize,
    pub required: usize,
    pub rule: DecisionRule,
}

/// Componente responsável por avaliar consenso com base em votos e quorum.
#[derive(Debug, Default, Clone)]
pub struct ConsensusEvaluator;

impl ConsensusEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Conta aprovações autenticadas de membros distintos do cluster.
    ///
    /// Votos de não-membros e votos repetidos do mesmo nó não contam; o
    /// resultado não depende da ordem dos votos.
    pub fn evaluate(&self, kind: OperationKind, votes: &[VoteRecord], view: &ClusterView) -> Verdict {
        let (required, rule) = view.required_approvals(kind);

        let approvers: HashSet<&NodeId> = votes
            .iter()
            .filter(|v| v.is_approval() && view.is_member(&v.voter))
            .map(|v| &v.voter)
            .collect();
        let approvals = approvers.len();
        let committed = approvals >= required;

        info!(
            "🗳️ Avaliando {} ({}): {}/{} aprovações => {}",
            kind,
            rule,
            approvals,
            required,
            if committed { "✅ APROVADA" } else { "❌ REJEITADA" }
        );

        Verdict { committed, approvals, required, rule }
    }
}
