use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tally_common::error::{Result, TallyError};
use tally_consensus::{EndpointResolver, Peer};

use crate::config::RegistryConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub url: String,
}

impl Registration {
    /// Splits `url` into the host and port the registry expects.
    pub fn from_url(name: &str, url: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(url).map_err(|e| TallyError::Config(format!("advertise url '{url}': {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| TallyError::Config(format!("advertise url '{url}' has no host")))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| TallyError::Config(format!("advertise url '{url}' has no port")))?;
        Ok(Self { name: name.to_string(), host, port, url: url.trim_end_matches('/').to_string() })
    }
}

#[derive(Debug, Deserialize)]
struct DiscoverResponse {
    url: String,
}

/// Client of the service registry that hands out current peer addresses.
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    registration: Registration,
}

impl RegistryClient {
    pub fn new(cfg: &RegistryConfig, registration: Registration, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Config(format!("http client: {e}")))?;
        Ok(Self { client, base_url: cfg.url.trim_end_matches('/').to_string(), registration })
    }

    pub async fn register(&self) -> Result<()> {
        let url = format!("{}/register", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&self.registration)
            .send()
            .await
            .map_err(|e| TallyError::Registry(format!("{url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(TallyError::Registry(format!("{url}: HTTP {}", resp.status())));
        }
        info!("🗂️ Registrado como [{}] em {}", self.registration.name, self.registration.url);
        Ok(())
    }

    /// Returns `Ok(false)` when the registry no longer knows this node.
    pub async fn heartbeat(&self) -> Result<bool> {
        let url = format!("{}/heartbeat/{}", self.base_url, self.registration.name);
        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| TallyError::Registry(format!("{url}: {e}")))?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(TallyError::Registry(format!("{url}: HTTP {s}"))),
        }
    }

    pub async fn discover(&self, name: &str) -> Result<String> {
        let url = format!("{}/discover/{}", self.base_url, name);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TallyError::Registry(format!("{url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(TallyError::Registry(format!("{url}: HTTP {}", resp.status())));
        }
        let found: DiscoverResponse = resp
            .json()
            .await
            .map_err(|e| TallyError::Registry(format!("{url}: {e}")))?;
        Ok(found.url)
    }

    /// Heartbeats on a fixed cadence, registering again when the registry forgot us.
    pub fn spawn_heartbeat(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.heartbeat().await {
                    Ok(true) => debug!("💓 Heartbeat enviado"),
                    Ok(false) => {
                        if let Err(e) = self.register().await {
                            warn!("⚠️ Re-registro falhou: {}", e);
                        }
                    }
                    Err(e) => warn!("⚠️ Heartbeat falhou: {}", e),
                }
            }
        })
    }
}

#[async_trait]
impl EndpointResolver for RegistryClient {
    async fn resolve(&self, peer: &Peer) -> Result<String> {
        self.discover(peer.id.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_from_url() {
        let reg = Registration::from_url("order-node-1", "http://order-node-1:8002/").unwrap();
        assert_eq!(reg.host, "order-node-1");
        assert_eq!(reg.port, 8002);
        assert_eq!(reg.url, "http://order-node-1:8002");

        let json = serde_json::to_value(&reg).unwrap();
        assert_eq!(json["name"], "order-node-1");
        assert_eq!(json["port"], 8002);

        assert_eq!(Registration::from_url("n", "http://host").unwrap().port, 80);
        assert!(Registration::from_url("n", "nope").is_err());
    }

    #[test]
    fn test_discover_body() {
        let body: DiscoverResponse =
            serde_json::from_str(r#"{"name":"order-node-2","url":"http://order-node-2:9123","port":9123,"host":"order-node-2"}"#)
                .unwrap();
        assert_eq!(body.url, "http://order-node-2:9123");
    }
}
