use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use tally_common::{error::Result, utils::NodeId};
use tally_consensus::{Coordinator, CoordinatorBuilder, EndpointResolver, StaticResolver};
use tally_ledger::InMemoryOrderStore;

use crate::{
    collaborators::{
        registry::{Registration, RegistryClient},
        secret_store::{build_authenticator, SecretStore, StaticSecretStore, VaultSecretStore},
    },
    config::Config,
    rpc::HttpPeerTransport,
};

/// Timeout for calls to the secret store and the registry.
const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TallyRuntime {
    pub coordinator: Arc<Coordinator>,
    /// Background loops (health poller, registry heartbeat).
    pub tasks: Vec<JoinHandle<()>>,
}

impl TallyRuntime {
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Wires collaborators, transport and store into a running coordinator.
pub async fn build_runtime(config: &Config) -> Result<TallyRuntime> {
    config.validate()?;
    let view = config.cluster_view()?;
    let members: Vec<NodeId> = view.members().iter().map(|p| p.id.clone()).collect();

    // 1) Chaves
    let store: Option<Box<dyn SecretStore>> = match (&config.secret_store, config.static_secrets.is_empty()) {
        (Some(cfg), _) => Some(Box::new(VaultSecretStore::new(cfg, COLLABORATOR_TIMEOUT)?)),
        (None, false) => Some(Box::new(StaticSecretStore::new(config.static_secrets.clone()))),
        (None, true) => None,
    };
    let auth = build_authenticator(store.as_deref(), &members).await;

    // 2) Registry (opcional)
    let mut tasks = Vec::new();
    let registry = match (&config.registry, config.registry_service_name()) {
        (Some(cfg), Some(name)) => {
            let registration = Registration::from_url(&name, &config.advertise_url())?;
            let client = Arc::new(RegistryClient::new(cfg, registration, COLLABORATOR_TIMEOUT)?);
            if let Err(e) = client.register().await {
                warn!("⚠️ Registro inicial falhou, heartbeat tentará de novo: {}", e);
            }
            if cfg.heartbeat_secs > 0 {
                tasks.push(Arc::clone(&client).spawn_heartbeat(Duration::from_secs(cfg.heartbeat_secs)));
            }
            Some(client)
        }
        _ => None,
    };
    let resolver: Arc<dyn EndpointResolver> = match &registry {
        Some(client) => Arc::clone(client) as Arc<dyn EndpointResolver>,
        None => Arc::new(StaticResolver),
    };

    // 3) Coordinator
    let settings = config.coordinator_settings();
    let transport = Arc::new(HttpPeerTransport::new(settings.vote_timeout)?);
    let coordinator = CoordinatorBuilder::new(view)
        .with_authenticator(auth)
        .with_store(Arc::new(InMemoryOrderStore::new()))
        .with_transport(transport)
        .with_resolver(resolver)
        .with_settings(settings)
        .build()?;
    let coordinator = Arc::new(coordinator);

    // 4) Health poller, fora do caminho de votação
    if config.health_interval_secs > 0 {
        tasks.push(coordinator.health().spawn_poller(Duration::from_secs(config.health_interval_secs)));
    }

    info!(
        "✅ Runtime pronto: node={} degraded={} registry={}",
        coordinator.local_id(),
        coordinator.is_degraded(),
        registry.is_some()
    );
    Ok(TallyRuntime { coordinator, tasks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_secrets_give_signed_votes() {
        let mut cfg = Config::default_for(NodeId::from("order-node-1"));
        cfg.health_interval_secs = 0;
        cfg.audit_dir = None;
        cfg.static_secrets = cfg.peers.iter().map(|p| (p.id.clone(), format!("secret-{}", p.id))).collect();

        let rt = build_runtime(&cfg).await.unwrap();
        assert!(!rt.coordinator.is_degraded());
        assert!(rt.tasks.is_empty());
        rt.shutdown();
    }

    #[tokio::test]
    async fn test_no_secrets_runs_degraded() {
        let mut cfg = Config::default_for(NodeId::from("order-node-1"));
        cfg.audit_dir = None;
        let rt = build_runtime(&cfg).await.unwrap();
        assert!(rt.coordinator.is_degraded());
        assert_eq!(rt.tasks.len(), 1);
        rt.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_membership_fails() {
        let cfg = Config::default_for(NodeId::from("stranger"));
        assert!(build_runtime(&cfg).await.is_err());
    }
}
