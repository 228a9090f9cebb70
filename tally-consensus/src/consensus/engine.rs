use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

use tally_common::{
    auth::Authenticator,
    env::{
        operation::{Operation, OperationPayload},
        order::OrderStatus,
        vote_data::{CommitNotice, VoteRecord, VoteRequest},
    },
    error::{Result, TallyError},
    utils::{time, NodeId},
};
use tally_ledger::{audit, Order, OrderMutation, OrderStore};

use crate::{
    cluster::{
        health::{ClusterStatus, HealthTracker, MAX_HEALTH_TIMEOUT},
        view::{ClusterView, ResolvedPeer},
    },
    consensus::{
        evaluator::ConsensusEvaluator,
        oplog::{OperationLog, OperationRecord, OperationStatus},
        outcome::{Outcome, ProposalOutcome, RejectReason},
        registry::{RegisterOutcome, VoteRegistry},
    },
    ports::{EndpointResolver, PeerTransport, StaticResolver},
    telemetry,
};

/// Tunables of a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Shared deadline for all vote requests of one round.
    pub vote_timeout: Duration,
    /// Per-probe timeout for the health tracker, clamped to two seconds.
    pub health_timeout: Duration,
    /// Send commit notices to approving peers after a commit.
    pub replicate_commits: bool,
    /// JSON-lines file receiving every decided operation.
    pub audit_path: Option<PathBuf>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            vote_timeout: Duration::from_secs(5),
            health_timeout: MAX_HEALTH_TIMEOUT,
            replicate_commits: true,
            audit_path: None,
        }
    }
}

/// Drives propose -> vote -> tally -> commit/reject for one node.
///
/// Every node runs a coordinator: it proposes operations for its own clients
/// and answers vote requests and commit notices from the other proposers.
pub struct Coordinator {
    pub(crate) view: Arc<ClusterView>,
    pub(crate) auth: Arc<dyn Authenticator>,
    pub(crate) store: Arc<dyn OrderStore>,
    pub(crate) transport: Arc<dyn PeerTransport>,
    pub(crate) resolver: Arc<dyn EndpointResolver>,
    pub(crate) health: Arc<HealthTracker>,
    pub(crate) registry: Mutex<VoteRegistry>,
    pub(crate) oplog: OperationLog,
    pub(crate) evaluator: ConsensusEvaluator,
    pub(crate) settings: CoordinatorSettings,
    pub(crate) byzantine_events: AtomicU64,
}

/// Builder pattern para montar um [`Coordinator`].
pub struct CoordinatorBuilder {
    view: ClusterView,
    auth: Option<Arc<dyn Authenticator>>,
    store: Option<Arc<dyn OrderStore>>,
    transport: Option<Arc<dyn PeerTransport>>,
    resolver: Option<Arc<dyn EndpointResolver>>,
    settings: CoordinatorSettings,
}

impl CoordinatorBuilder {
    pub fn new(view: ClusterView) -> Self {
        Self {
            view,
            auth: None,
            store: None,
            transport: None,
            resolver: None,
            settings: CoordinatorSettings::default(),
        }
    }

    pub fn with_authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn OrderStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to [`StaticResolver`] when not set.
    pub fn with_resolver(mut self, resolver: Arc<dyn EndpointResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<Coordinator> {
        let auth = self.auth.ok_or_else(|| TallyError::Config("coordinator requires an authenticator".into()))?;
        let store = self.store.ok_or_else(|| TallyError::Config("coordinator requires an order store".into()))?;
        let transport = self.transport.ok_or_else(|| TallyError::Config("coordinator requires a peer transport".into()))?;
        let resolver: Arc<dyn EndpointResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(StaticResolver),
        };

        let view = Arc::new(self.view);
        let health = Arc::new(HealthTracker::new(
            Arc::clone(&view),
            Arc::clone(&transport),
            Arc::clone(&resolver),
            self.settings.health_timeout,
            auth.is_degraded(),
        ));

        if auth.is_degraded() {
            warn!("⚠️ Node [{}] em modo degradado: votos sem assinatura", view.local_id());
        }
        info!(
            "🧩 Coordinator [{}] pronto: {} nós, quorum {}",
            view.local_id(),
            view.size(),
            view.quorum_size()
        );

        Ok(Coordinator {
            view,
            auth,
            store,
            transport,
            resolver,
            health,
            registry: Mutex::new(VoteRegistry::new()),
            oplog: OperationLog::new(),
            evaluator: ConsensusEvaluator::new(),
            settings: self.settings,
            byzantine_events: AtomicU64::new(0),
        })
    }
}

impl Coordinator {
    pub fn local_id(&self) -> &NodeId {
        self.view.local_id()
    }

    pub fn view(&self) -> &ClusterView {
        &self.view
    }

    pub fn health(&self) -> Arc<HealthTracker> {
        Arc::clone(&self.health)
    }

    pub fn is_degraded(&self) -> bool {
        self.auth.is_degraded()
    }

    pub fn byzantine_events(&self) -> u64 {
        self.byzantine_events.load(Ordering::Relaxed)
    }

    /// Fresh probe of every member; never touches the voting path.
    pub async fn cluster_status(&self) -> ClusterStatus {
        self.health.cluster_status(self.byzantine_events()).await
    }

    pub async fn get_operation(&self, operation_id: &str) -> Option<OperationRecord> {
        self.oplog.get(operation_id).await
    }

    pub async fn get_order(&self, order_id: &str) -> Option<Order> {
        self.store.get(order_id).await
    }

    pub async fn list_orders(&self) -> Vec<Order> {
        self.store.list().await
    }

    /// Creates a new operation with this node as proposer and runs a round for it.
    pub async fn propose(&self, payload: OperationPayload) -> Result<ProposalOutcome> {
        let operation = Operation::new(payload, self.local_id().clone())?;
        self.submit(operation).await
    }

    /// Runs one voting round for `operation`, or replays the earlier decision
    /// if this id was already decided here.
    pub async fn submit(&self, operation: Operation) -> Result<ProposalOutcome> {
        let _guard = self.oplog.lock(&operation.id).await;
        if let Some(record) = self.oplog.decided(&operation.id).await {
            info!("♻️ Operação [{}] já decidida ({:?}), sem reexecução", operation.id, record.status);
            return Ok(self.replay(record).await);
        }

        let kind = operation.kind();
        let (required, rule) = self.view.required_approvals(kind);
        let request = VoteRequest::from_operation(&operation)?;

        telemetry::proposal_started(kind);
        info!("📨 Propondo {} [{}] para {} nós", kind, operation.id, self.view.size());
        tracing::info!(target: "consensus", "EVENT:PROPOSE operation_id={} kind={} proposer={} required={} rule={}", operation.id, kind, operation.proposer, required, rule);

        self.oplog
            .record(OperationRecord {
                operation: operation.clone(),
                status: OperationStatus::InFlight,
                votes: Vec::new(),
                approvals: 0,
                required,
                rule,
                reason: None,
                order_id: None,
                decided_at: None,
                replica: false,
            })
            .await;
        self.registry.lock().await.register_operation(&operation.id);

        // endereços fixos durante toda a rodada
        let peers = self.view.resolve_round(self.resolver.as_ref()).await;
        self.collect_votes(&operation.id, &peers, &request).await;

        let votes = {
            let mut registry = self.registry.lock().await;
            registry.seal(&operation.id);
            registry.remove(&operation.id)
        };
        let verdict = self.evaluator.evaluate(kind, &votes, &self.view);

        let (outcome, reason, order) = if verdict.committed {
            match self.store.apply(self.mutation_for(&operation, verdict.approvals)).await {
                Ok(order) => (Outcome::Committed, None, Some(order)),
                Err(e) => {
                    warn!("⚠️ Operação [{}] aprovada mas não aplicada: {}", operation.id, e);
                    (Outcome::Rejected, Some(RejectReason::ApplyConflict(e.to_string())), None)
                }
            }
        } else {
            (Outcome::Rejected, Some(RejectReason::from_rule(rule)), None)
        };

        let record = OperationRecord {
            operation: operation.clone(),
            status: match outcome {
                Outcome::Committed => OperationStatus::Committed,
                Outcome::Rejected => OperationStatus::Rejected,
            },
            votes: votes.clone(),
            approvals: verdict.approvals,
            required: verdict.required,
            rule: verdict.rule,
            reason: reason.clone(),
            order_id: order.as_ref().map(|o| o.order_id.clone()),
            decided_at: Some(time::now()),
            replica: false,
        };
        self.finish(&record).await;

        match outcome {
            Outcome::Committed => {
                tracing::info!(target: "consensus", "EVENT:COMMIT operation_id={} kind={} approvals={}/{} rule={}", operation.id, kind, verdict.approvals, verdict.required, verdict.rule);
                if self.settings.replicate_commits {
                    self.broadcast_commit(&operation, &votes, &peers);
                }
            }
            Outcome::Rejected => {
                let why = reason.as_ref().map(RejectReason::message).unwrap_or_default();
                tracing::info!(target: "consensus", "EVENT:REJECT operation_id={} kind={} approvals={}/{} reason=\"{}\"", operation.id, kind, verdict.approvals, verdict.required, why);
            }
        }

        Ok(ProposalOutcome {
            outcome,
            operation_id: operation.id,
            kind,
            votes,
            approvals: verdict.approvals,
            required: verdict.required,
            rule: verdict.rule,
            reason,
            order,
            replayed: false,
        })
    }

    /// Asks every peer concurrently under one shared deadline and registers
    /// each vote as it arrives. Peers still silent at the deadline count as
    /// unreachable.
    async fn collect_votes(&self, operation_id: &str, peers: &[ResolvedPeer], request: &VoteRequest) {
        let deadline = Instant::now() + self.settings.vote_timeout;
        let mut pending: FuturesUnordered<_> = peers
            .iter()
            .map(|peer| async move {
                let answer = if &peer.id == self.local_id() {
                    self.cast_vote(request).await
                } else {
                    match tokio::time::timeout_at(deadline, self.transport.request_vote(peer, request)).await {
                        Ok(answer) => answer,
                        Err(_) => Err(TallyError::PeerUnreachable {
                            peer: peer.id.to_string(),
                            reason: format!("no vote within {:?}", self.settings.vote_timeout),
                        }),
                    }
                };
                (peer, answer)
            })
            .collect();

        while let Some((peer, answer)) = pending.next().await {
            let vote = self.authenticate(&peer.id, operation_id, answer);
            match self.registry.lock().await.register_vote(operation_id, vote) {
                RegisterOutcome::Recorded => {}
                other => debug!("Voto de [{}] em {} ignorado: {:?}", peer.id, operation_id, other),
            }
        }
    }

    /// Store mutation of a committed operation.
    ///
    /// Attributed to the proposer so every replica writes the same record.
    pub(crate) fn mutation_for(&self, operation: &Operation, approvals: usize) -> OrderMutation {
        let by = operation.proposer.clone();
        match &operation.payload {
            OperationPayload::CreateOrder(p) => {
                OrderMutation::Create(Order::from_commit(&operation.id, p, by, approvals))
            }
            OperationPayload::UpdateStatus(p) => OrderMutation::Transition {
                order_id: p.order_id.clone(),
                to: p.status,
                by,
            },
            OperationPayload::CancelOrder(p) => OrderMutation::Transition {
                order_id: p.order_id.clone(),
                to: OrderStatus::Cancelled,
                by,
            },
            OperationPayload::ProcessPayment(p) => OrderMutation::Pay {
                order_id: p.order_id.clone(),
                amount: p.amount,
                operation_id: operation.id.clone(),
                by,
            },
        }
    }

    /// Records a terminal decision: operation log, metrics and audit file.
    pub(crate) async fn finish(&self, record: &OperationRecord) {
        self.oplog.record(record.clone()).await;
        telemetry::operation_decided(match record.status {
            OperationStatus::Committed => "committed",
            _ => "rejected",
        });

        if let Some(path) = &self.settings.audit_path {
            if let Err(e) = audit::append_audit(path, record) {
                warn!("⚠️ Falha ao gravar auditoria em {}: {}", path.display(), e);
            }
        }
    }

    async fn replay(&self, record: OperationRecord) -> ProposalOutcome {
        let order = match &record.order_id {
            Some(id) => self.store.get(id).await,
            None => None,
        };
        ProposalOutcome {
            outcome: match record.status {
                OperationStatus::Committed => Outcome::Committed,
                _ => Outcome::Rejected,
            },
            operation_id: record.operation.id.clone(),
            kind: record.operation.kind(),
            votes: record.votes,
            approvals: record.approvals,
            required: record.required,
            rule: record.rule,
            reason: record.reason,
            order,
            replayed: true,
        }
    }

    /// Fire-and-forget commit notices to the peers whose approval was counted.
    fn broadcast_commit(&self, operation: &Operation, votes: &[VoteRecord], peers: &[ResolvedPeer]) {
        let targets: Vec<ResolvedPeer> = peers
            .iter()
            .filter(|p| &p.id != self.local_id())
            .filter(|p| votes.iter().any(|v| v.voter == p.id && v.is_approval()))
            .cloned()
            .collect();
        if targets.is_empty() {
            return;
        }

        let notice = CommitNotice { operation: operation.clone(), votes: votes.to_vec() };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let sends = targets.iter().map(|peer| {
                let transport = Arc::clone(&transport);
                let notice = &notice;
                async move { (peer, transport.send_commit(peer, notice).await) }
            });
            for (peer, res) in futures::future::join_all(sends).await {
                match res {
                    Ok(()) => debug!("📤 Commit [{}] replicado em [{}]", notice.operation.id, peer.id),
                    Err(e) => warn!("⚠️ Commit [{}] não replicado em [{}]: {}", notice.operation.id, peer.id, e),
                }
            }
        });
    }
}
