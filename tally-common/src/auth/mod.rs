pub mod degraded;
pub mod hmac_auth;

use crate::{
    env::vote_data::{vote_signing_bytes, Decision},
    error::Result,
    utils::NodeId,
};

/// Signs outgoing votes and verifies incoming ones.
pub trait Authenticator: Send + Sync {
    /// Signs `message` as `signer`. `None` means votes go out unsigned (degraded mode).
    fn sign(&self, signer: &NodeId, message: &[u8]) -> Result<Option<String>>;

    /// Checks `signature` against `signer`'s key. Unknown signers never verify.
    fn verify(&self, signer: &NodeId, message: &[u8], signature: &str) -> Result<bool>;

    /// True when no keys are available and verification is skipped.
    fn is_degraded(&self) -> bool;

    fn sign_vote(&self, operation_id: &str, decision: Decision, node_id: &NodeId) -> Result<Option<String>> {
        self.sign(node_id, &vote_signing_bytes(operation_id, decision, node_id))
    }

    fn verify_vote(&self, node_id: &NodeId, operation_id: &str, decision: Decision, signature: &str) -> Result<bool> {
        self.verify(node_id, &vote_signing_bytes(operation_id, decision, node_id), signature)
    }
}
