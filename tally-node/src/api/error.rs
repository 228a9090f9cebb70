use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use tally_common::{env::vote_data::VoteRecord, error::TallyError};
use tally_consensus::ProposalOutcome;

/// JSON error body: `{error, reason, ...}` plus the vote breakdown when a
/// proposal was rejected.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<Vec<VoteRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approvals: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, reason: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            reason: reason.to_string(),
            operation_id: None,
            votes: None,
            approvals: None,
            required: None,
            rule: None,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", what)
    }

    /// 409 for a proposal that did not commit.
    pub fn rejected(outcome: ProposalOutcome) -> Self {
        let (reason, error, rule) = match &outcome.reason {
            Some(r) => (r.code(), r.message(), r.rule().to_string()),
            None => ("rejected", "operation rejected".to_string(), outcome.rule.to_string()),
        };
        Self {
            status: StatusCode::CONFLICT,
            error,
            reason: reason.to_string(),
            operation_id: Some(outcome.operation_id),
            votes: Some(outcome.votes),
            approvals: Some(outcome.approvals),
            required: Some(outcome.required),
            rule: Some(rule),
        }
    }
}

impl From<TallyError> for ApiError {
    fn from(err: TallyError) -> Self {
        let status = match &err {
            TallyError::Validation(_) | TallyError::Serialization(_) => StatusCode::BAD_REQUEST,
            TallyError::NotFound(_) => StatusCode::NOT_FOUND,
            TallyError::IllegalTransition(_) | TallyError::Conflict(_) | TallyError::QuorumNotReached { .. } => {
                StatusCode::CONFLICT
            }
            TallyError::Auth(_) | TallyError::SignatureMismatch { .. } => StatusCode::FORBIDDEN,
            TallyError::PeerUnreachable { .. } | TallyError::Registry(_) | TallyError::SecretStoreUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut api = ApiError::new(status, err.reason_code(), err.to_string());
        if let TallyError::QuorumNotReached { approvals, required } = err {
            api.approvals = Some(approvals);
            api.required = Some(required);
        }
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
