//! Per-node signing secrets.
//!
//! The node only ever reads from the store. Keys for every member are loaded
//! once at startup; if any of them cannot be fetched the node runs degraded
//! for its whole lifetime.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use tally_common::{
    auth::{degraded::DegradedAuthenticator, hmac_auth::HmacAuthenticator, Authenticator},
    error::{Result, TallyError},
    utils::NodeId,
};

use crate::config::SecretStoreConfig;

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch_secret(&self, node: &NodeId) -> Result<Vec<u8>>;
}

/// Vault KV v2: `GET {addr}/v1/secret/data/{prefix}/{node}`, secret at `data.data.auth_token`.
pub struct VaultSecretStore {
    client: reqwest::Client,
    addr: String,
    token: String,
    path_prefix: String,
}

#[derive(Deserialize)]
struct KvResponse {
    data: KvData,
}

#[derive(Deserialize)]
struct KvData {
    data: KvSecret,
}

#[derive(Deserialize)]
struct KvSecret {
    auth_token: String,
}

impl VaultSecretStore {
    pub fn new(cfg: &SecretStoreConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            addr: cfg.addr.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            path_prefix: cfg.path_prefix.trim_matches('/').to_string(),
        })
    }

    fn secret_url(&self, node: &NodeId) -> String {
        format!("{}/v1/secret/data/{}/{}", self.addr, self.path_prefix, node)
    }
}

/// Extracts the secret from a KV v2 read response body.
pub fn parse_kv_secret(body: &[u8]) -> Result<Vec<u8>> {
    let parsed: KvResponse = serde_json::from_slice(body)?;
    let secret = parsed.data.data.auth_token;
    if secret.is_empty() {
        return Err(TallyError::SecretStoreUnavailable("empty auth_token".into()));
    }
    Ok(secret.into_bytes())
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn fetch_secret(&self, node: &NodeId) -> Result<Vec<u8>> {
        let url = self.secret_url(node);
        let resp = self
            .client
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| TallyError::SecretStoreUnavailable(format!("{url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(TallyError::SecretStoreUnavailable(format!("{url}: HTTP {}", resp.status())));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| TallyError::SecretStoreUnavailable(format!("{url}: {e}")))?;
        parse_kv_secret(&body).map_err(|e| TallyError::SecretStoreUnavailable(format!("{url}: {e}")))
    }
}

/// Secrets written in the config file.
pub struct StaticSecretStore {
    secrets: HashMap<NodeId, String>,
}

impl StaticSecretStore {
    pub fn new(secrets: HashMap<NodeId, String>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn fetch_secret(&self, node: &NodeId) -> Result<Vec<u8>> {
        self.secrets
            .get(node)
            .map(|s| s.clone().into_bytes())
            .ok_or_else(|| TallyError::SecretStoreUnavailable(format!("no static secret for {node}")))
    }
}

/// Loads every member's key, or falls back to [`DegradedAuthenticator`].
pub async fn build_authenticator(store: Option<&dyn SecretStore>, members: &[NodeId]) -> Arc<dyn Authenticator> {
    let Some(store) = store else {
        warn!("⚠️ Nenhum secret store configurado: modo degradado, votos sem assinatura");
        return Arc::new(DegradedAuthenticator);
    };

    let mut keys = HashMap::new();
    for node in members {
        match store.fetch_secret(node).await {
            Ok(secret) => {
                keys.insert(node.clone(), secret);
            }
            Err(e) => {
                warn!("⚠️ Secret store indisponível ({}): modo degradado, votos sem assinatura", e);
                return Arc::new(DegradedAuthenticator);
            }
        }
    }

    info!("🔐 Chaves de {} nós carregadas; votos assinados com HMAC-SHA256", keys.len());
    Arc::new(HmacAuthenticator::new(keys))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<NodeId> {
        vec![NodeId::from("n1"), NodeId::from("n2")]
    }

    #[test]
    fn test_parse_kv_secret() {
        let body = br#"{"data":{"data":{"auth_token":"s3cret"},"metadata":{"version":1}}}"#;
        assert_eq!(parse_kv_secret(body).unwrap(), b"s3cret".to_vec());
        assert!(parse_kv_secret(br#"{"data":{"data":{}}}"#).is_err());
        assert!(parse_kv_secret(br#"{"data":{"data":{"auth_token":""}}}"#).is_err());
    }

    #[test]
    fn test_vault_url_layout() {
        let cfg = SecretStoreConfig {
            addr: "http://vault:8200/".into(),
            token: "root".into(),
            path_prefix: "/bft-cluster/".into(),
        };
        let store = VaultSecretStore::new(&cfg, Duration::from_secs(1)).unwrap();
        assert_eq!(store.secret_url(&NodeId::from("order-node-1")), "http://vault:8200/v1/secret/data/bft-cluster/order-node-1");
    }

    #[tokio::test]
    async fn test_all_keys_gives_signing_authenticator() {
        let store = StaticSecretStore::new(members().into_iter().map(|n| (n.clone(), format!("k-{n}"))).collect());
        let auth = build_authenticator(Some(&store as &dyn SecretStore), &members()).await;
        assert!(!auth.is_degraded());
    }

    #[tokio::test]
    async fn test_missing_key_degrades() {
        let store = StaticSecretStore::new([(NodeId::from("n1"), "k".to_string())].into_iter().collect());
        assert!(build_authenticator(Some(&store as &dyn SecretStore), &members()).await.is_degraded());
        assert!(build_authenticator(None, &members()).await.is_degraded());
    }
}
