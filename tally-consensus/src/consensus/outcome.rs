use std::fmt;

use serde::{Deserialize, Serialize};

use tally_common::env::{operation::OperationKind, vote_data::VoteRecord};
use tally_ledger::Order;

use crate::consensus::evaluator::DecisionRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Committed,
    Rejected,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Committed => "committed",
            Outcome::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a decided operation did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    QuorumNotReached,
    UnanimityNotReached,
    /// Votes were sufficient but the store refused the mutation.
    ApplyConflict(String),
}

impl RejectReason {
    pub fn from_rule(rule: DecisionRule) -> Self {
        match rule {
            DecisionRule::Quorum => RejectReason::QuorumNotReached,
            DecisionRule::Unanimity => RejectReason::UnanimityNotReached,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::QuorumNotReached => "quorum_not_reached",
            RejectReason::UnanimityNotReached => "unanimity_not_reached",
            RejectReason::ApplyConflict(_) => "apply_conflict",
        }
    }

    /// Rule name reported to callers.
    pub fn rule(&self) -> &'static str {
        match self {
            RejectReason::QuorumNotReached => "quorum",
            RejectReason::UnanimityNotReached => "unanimity",
            RejectReason::ApplyConflict(_) => "apply_conflict",
        }
    }

    pub fn message(&self) -> String {
        match self {
            RejectReason::QuorumNotReached => "quorum not reached".to_string(),
            RejectReason::UnanimityNotReached => "unanimity not reached".to_string(),
            RejectReason::ApplyConflict(detail) => format!("apply conflict: {detail}"),
        }
    }
}

/// Result of a `propose` call, including the full vote ledger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalOutcome {
    pub outcome: Outcome,
    pub operation_id: String,
    pub kind: OperationKind,
    pub votes: Vec<VoteRecord>,
    pub approvals: usize,
    pub required: usize,
    pub rule: DecisionRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    /// True when the operation id had already been decided and nothing was re-run.
    pub replayed: bool,
}

impl ProposalOutcome {
    pub fn is_committed(&self) -> bool {
        self.outcome == Outcome::Committed
    }
}
