use thiserror::Error;

/// Errors raised anywhere in the voting pipeline, from payload validation to
/// collaborator lookups.
///
/// Each variant carries a stable reason code (see [`TallyError::reason_code`])
/// that the HTTP layer exposes to callers.
#[derive(Debug, Error)]
pub enum TallyError {
    /// The operation payload failed its semantic validator.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A peer did not answer a vote or health request in time, or the transport failed.
    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// A vote signature did not match the claimed voter's key.
    #[error("Signature mismatch for voter {voter}")]
    SignatureMismatch { voter: String },

    /// Approvals fell short of the threshold required by the operation kind.
    #[error("Quorum not reached: {approvals}/{required} approvals")]
    QuorumNotReached { approvals: usize, required: usize },

    /// The secret store could not be reached or returned no key.
    #[error("Secret store unavailable: {0}")]
    SecretStoreUnavailable(String),

    #[error("Service registry error: {0}")]
    Registry(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The requested order status change is not allowed by the state machine.
    #[error("Illegal transition: {0}")]
    IllegalTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other: {0}")]
    Other(String),
}

impl TallyError {
    /// Stable snake_case code surfaced in JSON error bodies.
    pub fn reason_code(&self) -> &'static str {
        match self {
            TallyError::Validation(_) => "validation_failure",
            TallyError::PeerUnreachable { .. } => "peer_unreachable",
            TallyError::SignatureMismatch { .. } => "signature_mismatch",
            TallyError::QuorumNotReached { .. } => "quorum_not_reached",
            TallyError::SecretStoreUnavailable(_) => "secret_store_unavailable",
            TallyError::Registry(_) => "registry_error",
            TallyError::Auth(_) => "auth_error",
            TallyError::Config(_) => "invalid_config",
            TallyError::Storage(_) => "storage_error",
            TallyError::NotFound(_) => "not_found",
            TallyError::IllegalTransition(_) => "illegal_transition",
            TallyError::Conflict(_) => "conflict",
            TallyError::Serialization(_) => "serialization_error",
            TallyError::Io(_) => "io_error",
            TallyError::Other(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, TallyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_stable() {
        let err = TallyError::QuorumNotReached { approvals: 1, required: 2 };
        assert_eq!(err.reason_code(), "quorum_not_reached");
        assert_eq!(err.to_string(), "Quorum not reached: 1/2 approvals");

        let err = TallyError::PeerUnreachable { peer: "order-node-2".into(), reason: "timeout".into() };
        assert_eq!(err.reason_code(), "peer_unreachable");
    }
}
