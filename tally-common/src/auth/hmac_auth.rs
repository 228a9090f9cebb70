use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::Authenticator;
use crate::{
    error::{Result, TallyError},
    utils::NodeId,
};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 vote authentication keyed by per-node secrets.
///
/// The keyring holds the local node's secret (used for signing) and every
/// peer's secret (used to verify their votes), as fetched from the secret store.
pub struct HmacAuthenticator {
    keys: HashMap<NodeId, Vec<u8>>,
}

impl HmacAuthenticator {
    pub fn new(keys: HashMap<NodeId, Vec<u8>>) -> Self {
        Self { keys }
    }

    fn mac_for(&self, node: &NodeId) -> Result<Option<HmacSha256>> {
        match self.keys.get(node) {
            Some(key) => HmacSha256::new_from_slice(key)
                .map(Some)
                .map_err(|e| TallyError::Auth(format!("invalid key for {node}: {e}"))),
            None => Ok(None),
        }
    }
}

impl Authenticator for HmacAuthenticator {
    fn sign(&self, signer: &NodeId, message: &[u8]) -> Result<Option<String>> {
        let mut mac = self
            .mac_for(signer)?
            .ok_or_else(|| TallyError::Auth(format!("no signing key for {signer}")))?;
        mac.update(message);
        Ok(Some(hex::encode(mac.finalize().into_bytes())))
    }

    fn verify(&self, signer: &NodeId, message: &[u8], signature: &str) -> Result<bool> {
        let Some(mut mac) = self.mac_for(signer)? else {
            return Ok(false);
        };
        let Ok(raw) = hex::decode(signature) else {
            return Ok(false);
        };
        mac.update(message);
        // verify_slice compara em tempo constante
        Ok(mac.verify_slice(&raw).is_ok())
    }

    fn is_degraded(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::vote_data::Decision;

    fn keyring() -> HmacAuthenticator {
        let mut keys = HashMap::new();
        keys.insert(NodeId::from("n1"), b"secret-one".to_vec());
        keys.insert(NodeId::from("n2"), b"secret-two".to_vec());
        HmacAuthenticator::new(keys)
    }

    #[test]
    fn test_hmac_signing_and_verification() {
        let auth = keyring();
        let n1 = NodeId::from("n1");

        let sig = auth.sign_vote("op1", Decision::Approve, &n1).unwrap().expect("signed");
        assert_eq!(sig.len(), 64);
        assert!(auth.verify_vote(&n1, "op1", Decision::Approve, &sig).unwrap());

        // Flipping the decision invalidates the signature
        assert!(!auth.verify_vote(&n1, "op1", Decision::Reject, &sig).unwrap());
        // Another node's key does not verify it either
        assert!(!auth.verify_vote(&NodeId::from("n2"), "op1", Decision::Approve, &sig).unwrap());
    }

    #[test]
    fn test_forged_and_unknown_signers_fail() {
        let auth = keyring();
        assert!(!auth.verify_vote(&NodeId::from("n1"), "op1", Decision::Approve, "zz-not-hex").unwrap());
        assert!(!auth.verify_vote(&NodeId::from("n1"), "op1", Decision::Approve, &"00".repeat(32)).unwrap());
        assert!(!auth.verify_vote(&NodeId::from("n9"), "op1", Decision::Approve, &"00".repeat(32)).unwrap());
        assert!(auth.sign_vote("op1", Decision::Approve, &NodeId::from("n9")).is_err());
    }
}
