use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    env::operation::{Operation, OperationKind, OperationPayload},
    error::Result,
    utils::NodeId,
};

/// A peer's verdict on an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `POST /consensus/vote`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub operation_id: String,
    pub kind: OperationKind,
    pub payload: Value,
    pub proposer: NodeId,
}

impl VoteRequest {
    pub fn from_operation(op: &Operation) -> Result<Self> {
        Ok(Self {
            operation_id: op.id.clone(),
            kind: op.kind(),
            payload: op.payload.to_value()?,
            proposer: op.proposer.clone(),
        })
    }

    /// Typed payload, or the decode error a validator reports as a reject reason.
    pub fn decode_payload(&self) -> Result<OperationPayload> {
        OperationPayload::decode(self.kind, self.payload.clone())
    }
}

/// A peer's signed answer to a [`VoteRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub node_id: NodeId,
    pub operation_id: String,
    pub decision: Decision,
    /// Hex HMAC; absent when the voter runs in degraded mode.
    #[serde(default)]
    pub signature: Option<String>,
    /// Informational only, never part of the signed bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// How a vote ended up in the tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    /// Signature verified (or verification skipped in degraded mode).
    Counted,
    /// Peer timed out or the transport failed.
    Unreachable,
    /// Response could not be parsed or named another operation.
    Unparseable,
    /// No signature while the tallying node requires one.
    Unsigned,
    /// Signature did not verify against the claimed voter's key.
    Byzantine,
}

/// One line of the vote ledger returned to callers for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub voter: NodeId,
    /// Decision as counted: anything not [`VoteStatus::Counted`] is a reject.
    pub decision: Decision,
    /// Decision the voter claimed, when a response was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed: Option<Decision>,
    #[serde(default)]
    pub signature: Option<String>,
    pub status: VoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VoteRecord {
    pub fn counted(response: VoteResponse) -> Self {
        Self {
            voter: response.node_id,
            decision: response.decision,
            claimed: Some(response.decision),
            signature: response.signature,
            status: VoteStatus::Counted,
            reason: response.reason,
        }
    }

    /// An implicit reject: no usable vote was obtained from `voter`.
    pub fn implicit_reject(voter: NodeId, status: VoteStatus, reason: impl Into<String>) -> Self {
        Self {
            voter,
            decision: Decision::Reject,
            claimed: None,
            signature: None,
            status,
            reason: Some(reason.into()),
        }
    }

    /// A response was received but discarded; its claim is kept for audit.
    pub fn discarded(response: VoteResponse, voter: NodeId, status: VoteStatus, reason: impl Into<String>) -> Self {
        Self {
            voter,
            decision: Decision::Reject,
            claimed: Some(response.decision),
            signature: response.signature,
            status,
            reason: Some(reason.into()),
        }
    }

    pub fn is_approval(&self) -> bool {
        self.status == VoteStatus::Counted && self.decision == Decision::Approve
    }
}

/// Body of `POST /consensus/commit`: a decided operation plus the ledger that justified it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitNotice {
    pub operation: Operation,
    pub votes: Vec<VoteRecord>,
}

/// Bytes covered by a vote signature: `operationId || decision || nodeId`.
///
/// Fields are joined with `|`, which cannot appear in a hex operation id or a decision.
pub fn vote_signing_bytes(operation_id: &str, decision: Decision, node_id: &NodeId) -> Vec<u8> {
    format!("{}|{}|{}", operation_id, decision.as_str(), node_id).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_response_wire_names() {
        let json = r#"{"nodeId":"order-node-2","operationId":"abc","decision":"approve","signature":"00ff"}"#;
        let resp: VoteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.node_id, NodeId::from("order-node-2"));
        assert_eq!(resp.decision, Decision::Approve);
        assert!(resp.reason.is_none());
    }

    #[test]
    fn test_signing_bytes_bind_every_field() {
        let node = NodeId::from("n1");
        let base = vote_signing_bytes("op1", Decision::Approve, &node);
        assert_ne!(base, vote_signing_bytes("op1", Decision::Reject, &node));
        assert_ne!(base, vote_signing_bytes("op2", Decision::Approve, &node));
        assert_ne!(base, vote_signing_bytes("op1", Decision::Approve, &NodeId::from("n2")));
    }

    #[test]
    fn test_discarded_vote_never_approves() {
        let resp = VoteResponse {
            node_id: NodeId::from("n3"),
            operation_id: "op1".into(),
            decision: Decision::Approve,
            signature: Some("forged".into()),
            reason: None,
        };
        let record = VoteRecord::discarded(resp, NodeId::from("n3"), VoteStatus::Byzantine, "bad signature");
        assert_eq!(record.decision, Decision::Reject);
        assert_eq!(record.claimed, Some(Decision::Approve));
        assert!(!record.is_approval());
    }
}
