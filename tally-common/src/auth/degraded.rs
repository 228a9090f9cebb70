use super::Authenticator;
use crate::{error::Result, utils::NodeId};

/// Used when the secret store was unreachable at startup.
///
/// Votes are emitted unsigned and every signature check passes; callers are
/// expected to surface [`Authenticator::is_degraded`] in their status output.
#[derive(Debug, Default, Clone)]
pub struct DegradedAuthenticator;

impl Authenticator for DegradedAuthenticator {
    fn sign(&self, _signer: &NodeId, _message: &[u8]) -> Result<Option<String>> {
        Ok(None)
    }

    fn verify(&self, _signer: &NodeId, _message: &[u8], _signature: &str) -> Result<bool> {
        Ok(true)
    }

    fn is_degraded(&self) -> bool {
        true
    }
}
