use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
    env::order::{CancelOrderPayload, CreateOrderPayload, ProcessPaymentPayload, UpdateStatusPayload},
    error::{Result, TallyError},
    utils::{time, NodeId},
};

/// Length (hex chars) of a derived operation id.
const OPERATION_ID_LEN: usize = 16;

/// Kind of mutation a proposer asks the cluster to vote on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    CreateOrder,
    UpdateStatus,
    CancelOrder,
    ProcessPayment,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::CreateOrder => "CREATE_ORDER",
            OperationKind::UpdateStatus => "UPDATE_STATUS",
            OperationKind::CancelOrder => "CANCEL_ORDER",
            OperationKind::ProcessPayment => "PROCESS_PAYMENT",
        }
    }

    /// Financial mutations need every node's approval.
    pub fn requires_unanimity(self) -> bool {
        matches!(self, OperationKind::ProcessPayment)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed payload, one variant per operation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    CreateOrder(CreateOrderPayload),
    UpdateStatus(UpdateStatusPayload),
    CancelOrder(CancelOrderPayload),
    ProcessPayment(ProcessPaymentPayload),
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationPayload::CreateOrder(_) => OperationKind::CreateOrder,
            OperationPayload::UpdateStatus(_) => OperationKind::UpdateStatus,
            OperationPayload::CancelOrder(_) => OperationKind::CancelOrder,
            OperationPayload::ProcessPayment(_) => OperationKind::ProcessPayment,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            OperationPayload::CreateOrder(p) => serde_json::to_value(p)?,
            OperationPayload::UpdateStatus(p) => serde_json::to_value(p)?,
            OperationPayload::CancelOrder(p) => serde_json::to_value(p)?,
            OperationPayload::ProcessPayment(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Decodes a loosely-typed wire payload into the variant named by `kind`.
    pub fn decode(kind: OperationKind, value: Value) -> Result<Self> {
        let payload = match kind {
            OperationKind::CreateOrder => OperationPayload::CreateOrder(serde_json::from_value(value)?),
            OperationKind::UpdateStatus => OperationPayload::UpdateStatus(serde_json::from_value(value)?),
            OperationKind::CancelOrder => OperationPayload::CancelOrder(serde_json::from_value(value)?),
            OperationKind::ProcessPayment => OperationPayload::ProcessPayment(serde_json::from_value(value)?),
        };
        Ok(payload)
    }
}

/// An operation proposed to the cluster.
///
/// The id is derived from kind, payload, proposer, creation time and a random
/// nonce, so two proposals of identical content never share an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "OperationWire", try_from = "OperationWire")]
pub struct Operation {
    pub id: String,
    pub payload: OperationPayload,
    pub proposer: NodeId,
    pub created_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(payload: OperationPayload, proposer: NodeId) -> Result<Self> {
        let created_at = time::now();
        let nonce = uuid::Uuid::new_v4().to_string();
        let id = derive_operation_id(payload.kind(), &payload.to_value()?, &proposer, &created_at, &nonce);
        Ok(Self { id, payload, proposer, created_at })
    }

    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }
}

/// Flat JSON shape shared by the vote request and the operation lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationWire {
    id: String,
    kind: OperationKind,
    payload: Value,
    proposer: NodeId,
    created_at: DateTime<Utc>,
}

impl From<Operation> for OperationWire {
    fn from(op: Operation) -> Self {
        // to_value só falha com mapas de chave não-string, que os payloads não têm
        let payload = op.payload.to_value().unwrap_or(Value::Null);
        OperationWire {
            id: op.id,
            kind: op.payload.kind(),
            payload,
            proposer: op.proposer,
            created_at: op.created_at,
        }
    }
}

impl TryFrom<OperationWire> for Operation {
    type Error = TallyError;

    fn try_from(wire: OperationWire) -> Result<Self> {
        Ok(Operation {
            id: wire.id,
            payload: OperationPayload::decode(wire.kind, wire.payload)?,
            proposer: wire.proposer,
            created_at: wire.created_at,
        })
    }
}

/// `sha256(kind:payload:nanos:nonce:proposer)`, truncated to [`OPERATION_ID_LEN`] hex chars.
pub fn derive_operation_id(
    kind: OperationKind,
    payload: &Value,
    proposer: &NodeId,
    created_at: &DateTime<Utc>,
    nonce: &str,
) -> String {
    // serde_json::Map is ordered, so the payload text is canonical
    let input = format!(
        "{}:{}:{}:{}:{}",
        kind.as_str(),
        payload,
        time::unix_nanos(created_at),
        nonce,
        proposer
    );
    let digest = Sha256::digest(input.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(OPERATION_ID_LEN);
    id
}
