use std::{collections::HashMap, fs, io, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use tally_common::{
    error::{Result, TallyError},
    utils::NodeId,
};
use tally_consensus::{ClusterView, CoordinatorSettings, Peer};

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_vote_timeout_ms() -> u64 {
    5_000
}

fn default_health_timeout_ms() -> u64 {
    2_000
}

fn default_health_interval_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_path_prefix() -> String {
    "bft-cluster".to_string()
}

fn default_heartbeat_secs() -> u64 {
    10
}

/// Vault-style KV store holding one signing secret per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretStoreConfig {
    pub addr: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub url: String,
    /// Name this node registers under; defaults to the node id.
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub node_id: NodeId,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// URL peers use to reach this node; derived from `listen_addr` when absent.
    #[serde(default)]
    pub advertise_url: Option<String>,
    /// Every cluster member, this node included.
    pub peers: Vec<Peer>,
    #[serde(default = "default_vote_timeout_ms")]
    pub vote_timeout_ms: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    /// 0 disables the background poller.
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    #[serde(default = "default_true")]
    pub replicate_commits: bool,
    #[serde(default)]
    pub audit_dir: Option<PathBuf>,
    #[serde(default)]
    pub secret_store: Option<SecretStoreConfig>,
    /// Fixed secrets per node, for local clusters without a secret store.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub static_secrets: HashMap<NodeId, String>,
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

impl Config {
    /// Three-node local cluster, with this node listening on its slot's port.
    pub fn default_for(node_id: NodeId) -> Self {
        let peers: Vec<Peer> = (1..=3)
            .map(|i| Peer {
                id: NodeId(format!("order-node-{i}")),
                endpoint: format!("http://127.0.0.1:{}", 8000 + i),
            })
            .collect();
        let listen_addr = peers
            .iter()
            .find(|p| p.id == node_id)
            .and_then(|p| p.endpoint.rsplit(':').next())
            .map(|port| format!("0.0.0.0:{port}"))
            .unwrap_or_else(default_listen_addr);

        Self {
            node_id,
            listen_addr,
            advertise_url: None,
            peers,
            vote_timeout_ms: default_vote_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
            health_interval_secs: default_health_interval_secs(),
            replicate_commits: true,
            audit_dir: Some(PathBuf::from("data")),
            secret_store: None,
            static_secrets: HashMap::new(),
            registry: None,
        }
    }

    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(path, json)
    }

    pub fn load_from_file(path: &str) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let parsed =
            serde_json::from_str::<Config>(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(parsed)
    }

    /// Applies the container-style environment variables on top of the file.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("NODE_ID") {
            self.node_id = NodeId(id);
        }
        if let Some(addr) = lookup("LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(nodes) = lookup("CLUSTER_NODES") {
            self.peers = parse_cluster_nodes(&nodes)?;
        }
        if let Some(addr) = lookup("VAULT_ADDR") {
            let token = lookup("VAULT_TOKEN").unwrap_or_default();
            match &mut self.secret_store {
                Some(store) => {
                    store.addr = addr;
                    if !token.is_empty() {
                        store.token = token;
                    }
                }
                None => {
                    self.secret_store = Some(SecretStoreConfig { addr, token, path_prefix: default_path_prefix() })
                }
            }
        } else if let (Some(token), Some(store)) = (lookup("VAULT_TOKEN"), self.secret_store.as_mut()) {
            store.token = token;
        }
        if let Some(url) = lookup("REGISTRY_URL") {
            match &mut self.registry {
                Some(registry) => registry.url = url,
                None => {
                    self.registry = Some(RegistryConfig {
                        url,
                        service_name: None,
                        heartbeat_secs: default_heartbeat_secs(),
                    })
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.as_str().trim().is_empty() {
            return Err(TallyError::Config("node_id is empty".into()));
        }
        if self.vote_timeout_ms == 0 {
            return Err(TallyError::Config("vote_timeout_ms must be positive".into()));
        }
        // a mesma checagem de membros que o ClusterView faz
        self.cluster_view().map(|_| ())
    }

    pub fn cluster_view(&self) -> Result<ClusterView> {
        ClusterView::new(self.node_id.clone(), self.peers.clone())
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            vote_timeout: Duration::from_millis(self.vote_timeout_ms),
            health_timeout: Duration::from_millis(self.health_timeout_ms.min(default_health_timeout_ms())),
            replicate_commits: self.replicate_commits,
            audit_path: self.audit_path(),
        }
    }

    pub fn audit_path(&self) -> Option<PathBuf> {
        self.audit_dir.as_ref().map(|dir| dir.join(format!("audit-{}.jsonl", self.node_id)))
    }

    /// The URL this node registers and advertises.
    pub fn advertise_url(&self) -> String {
        if let Some(url) = &self.advertise_url {
            return url.clone();
        }
        if let Some(peer) = self.peers.iter().find(|p| p.id == self.node_id) {
            return peer.endpoint.clone();
        }
        format!("http://{}", self.listen_addr.replace("0.0.0.0", "127.0.0.1"))
    }

    pub fn registry_service_name(&self) -> Option<String> {
        self.registry
            .as_ref()
            .map(|r| r.service_name.clone().unwrap_or_else(|| self.node_id.to_string()))
    }
}

/// Parses `CLUSTER_NODES`: comma-separated `id=url` entries, or plain URLs
/// whose host name is taken as the node id.
pub fn parse_cluster_nodes(raw: &str) -> Result<Vec<Peer>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((id, url)) => Ok(Peer { id: NodeId::from(id.trim()), endpoint: url.trim().to_string() }),
            None => {
                let url = reqwest::Url::parse(entry)
                    .map_err(|e| TallyError::Config(format!("invalid cluster node '{entry}': {e}")))?;
                let host = url
                    .host_str()
                    .ok_or_else(|| TallyError::Config(format!("cluster node '{entry}' has no host")))?;
                Ok(Peer { id: NodeId::from(host), endpoint: entry.trim_end_matches('/').to_string() })
            }
        })
        .collect()
}
