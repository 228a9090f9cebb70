//! Three coordinators wired over an in-memory transport.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use tally_common::{
    auth::{hmac_auth::HmacAuthenticator, Authenticator},
    env::{
        operation::{Operation, OperationPayload},
        order::{CreateOrderPayload, LineItem, OrderStatus, ProcessPaymentPayload, UpdateStatusPayload},
        vote_data::{CommitNotice, Decision, VoteRecord, VoteRequest, VoteResponse, VoteStatus},
    },
    error::{Result, TallyError},
    utils::NodeId,
};
use tally_consensus::{
    ClusterView, Coordinator, CoordinatorBuilder, CoordinatorSettings, OperationStatus, Outcome, Peer,
    PeerTransport, ProposalOutcome, RejectReason, ResolvedPeer,
};
use tally_ledger::InMemoryOrderStore;

#[derive(Clone)]
enum Tamper {
    /// Answers approve with a signature made with the wrong key.
    ForgeApprove,
    /// Answers with a correctly signed vote of another node.
    Impersonate(NodeId),
    /// Never answers.
    Hang,
    /// Answers with a body that is not a vote.
    Garbage,
    /// Answers a correctly signed vote for another operation id.
    WrongOperation,
    /// Answers approve with the signature stripped.
    Unsigned,
}

#[derive(Default)]
struct Network {
    nodes: RwLock<HashMap<NodeId, Arc<Coordinator>>>,
    down: RwLock<HashSet<NodeId>>,
    tamper: RwLock<HashMap<NodeId, Tamper>>,
}

impl Network {
    async fn node(&self, id: &NodeId) -> Result<Arc<Coordinator>> {
        if self.down.read().await.contains(id) {
            return Err(TallyError::PeerUnreachable { peer: id.to_string(), reason: "connection refused".into() });
        }
        self.nodes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TallyError::PeerUnreachable { peer: id.to_string(), reason: "no route".into() })
    }

    async fn stop(&self, id: &str) {
        self.down.write().await.insert(NodeId::from(id));
    }
}

struct InMemoryTransport {
    net: Arc<Network>,
}

#[async_trait]
impl PeerTransport for InMemoryTransport {
    async fn request_vote(&self, peer: &ResolvedPeer, request: &VoteRequest) -> Result<VoteResponse> {
        let node = self.net.node(&peer.id).await?;
        let tamper = self.net.tamper.read().await.get(&peer.id).cloned();
        match tamper {
            None => node.cast_vote(request).await,
            Some(Tamper::ForgeApprove) => {
                let wrong_key = auth_for(&["mallory"]);
                let signature = wrong_key.sign_vote(&request.operation_id, Decision::Approve, &NodeId::from("mallory"))?;
                Ok(VoteResponse {
                    node_id: peer.id.clone(),
                    operation_id: request.operation_id.clone(),
                    decision: Decision::Approve,
                    signature,
                    reason: None,
                })
            }
            Some(Tamper::Impersonate(other)) => {
                let target = self.net.node(&other).await?;
                target.cast_vote(request).await
            }
            Some(Tamper::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TallyError::Other("unreachable".into()))
            }
            Some(Tamper::Garbage) => {
                let err = serde_json::from_str::<VoteResponse>("<html>502 Bad Gateway</html>").unwrap_err();
                Err(TallyError::Serialization(err))
            }
            Some(Tamper::WrongOperation) => {
                let mut other = request.clone();
                other.operation_id = "0000000000000000".into();
                node.cast_vote(&other).await
            }
            Some(Tamper::Unsigned) => {
                let mut vote = node.cast_vote(request).await?;
                vote.signature = None;
                Ok(vote)
            }
        }
    }

    async fn send_commit(&self, peer: &ResolvedPeer, notice: &CommitNotice) -> Result<()> {
        let node = self.net.node(&peer.id).await?;
        node.apply_commit(notice.clone()).await.map(|_| ())
    }

    async fn probe(&self, peer: &ResolvedPeer) -> Result<()> {
        self.net.node(&peer.id).await.map(|_| ())
    }
}

const NODES: [&str; 3] = ["order-node-1", "order-node-2", "order-node-3"];

fn auth_for(ids: &[&str]) -> HmacAuthenticator {
    let keys = ids
        .iter()
        .map(|id| (NodeId::from(*id), format!("secret-{id}").into_bytes()))
        .collect();
    HmacAuthenticator::new(keys)
}

async fn cluster() -> (Arc<Network>, Vec<Arc<Coordinator>>) {
    let net = Arc::new(Network::default());
    let members: Vec<Peer> = NODES
        .iter()
        .map(|id| Peer { id: NodeId::from(*id), endpoint: format!("http://{id}:8000") })
        .collect();

    let mut coords = Vec::new();
    for id in NODES {
        let view = ClusterView::new(NodeId::from(id), members.clone()).unwrap();
        let coord = CoordinatorBuilder::new(view)
            .with_authenticator(Arc::new(auth_for(&NODES)))
            .with_store(Arc::new(InMemoryOrderStore::new()))
            .with_transport(Arc::new(InMemoryTransport { net: Arc::clone(&net) }))
            .with_settings(CoordinatorSettings { vote_timeout: Duration::from_millis(300), ..Default::default() })
            .build()
            .unwrap();
        let coord = Arc::new(coord);
        net.nodes.write().await.insert(NodeId::from(id), Arc::clone(&coord));
        coords.push(coord);
    }
    (net, coords)
}

fn create_order() -> OperationPayload {
    OperationPayload::CreateOrder(CreateOrderPayload {
        customer_id: "C1".into(),
        items: vec![LineItem { sku: "P1".into(), quantity: 1, price: 10.0 }],
    })
}

async fn wait_for_order(coord: &Coordinator, order_id: &str) -> bool {
    for _ in 0..50 {
        if coord.get_order(order_id).await.is_some() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn scenario_a_all_healthy_commits_with_three_votes() {
    let (_net, nodes) = cluster().await;

    let out = nodes[0].propose(create_order()).await.unwrap();
    assert_eq!(out.outcome, Outcome::Committed);
    assert_eq!(out.approvals, 3);
    assert_eq!(out.votes.len(), 3);
    assert!(out.votes.iter().all(|v| v.status == VoteStatus::Counted && v.signature.is_some()));

    let order = out.order.unwrap();
    assert_eq!(order.total, 10.0);
    assert_eq!(order.authenticated_votes, 3);
    assert_eq!(order.created_by, NodeId::from("order-node-1"));
}

#[tokio::test]
async fn scenario_b_one_node_down_still_commits() {
    let (net, nodes) = cluster().await;
    net.stop("order-node-2").await;

    let out = nodes[0].propose(create_order()).await.unwrap();
    assert_eq!(out.outcome, Outcome::Committed);
    assert_eq!(out.approvals, 2);

    let missing = out.votes.iter().find(|v| v.voter == NodeId::from("order-node-2")).unwrap();
    assert_eq!(missing.status, VoteStatus::Unreachable);
    assert_eq!(missing.decision, Decision::Reject);
    assert!(missing.signature.is_none());

    let status = nodes[0].cluster_status().await;
    assert_eq!(status.healthy_nodes, 2);
    assert!(status.quorum_available);
}

#[tokio::test]
async fn scenario_c_two_nodes_down_rejects() {
    let (net, nodes) = cluster().await;
    net.stop("order-node-2").await;
    net.stop("order-node-3").await;

    let status = nodes[0].cluster_status().await;
    assert!(!status.quorum_available);

    let out = nodes[0].propose(create_order()).await.unwrap();
    assert_eq!(out.outcome, Outcome::Rejected);
    assert_eq!(out.approvals, 1);
    assert_eq!(out.reason.as_ref().unwrap().message(), "quorum not reached");
    assert!(nodes[0].list_orders().await.is_empty());
}

#[tokio::test]
async fn scenario_d_forged_vote_is_discarded() {
    let (net, nodes) = cluster().await;
    net.tamper.write().await.insert(NodeId::from("order-node-3"), Tamper::ForgeApprove);

    let out = nodes[0].propose(create_order()).await.unwrap();
    // n1 e n2 bastam para o quorum; a falsificação não soma
    assert_eq!(out.outcome, Outcome::Committed);
    assert_eq!(out.approvals, 2);

    let forged = out.votes.iter().find(|v| v.voter == NodeId::from("order-node-3")).unwrap();
    assert_eq!(forged.status, VoteStatus::Byzantine);
    assert_eq!(forged.claimed, Some(Decision::Approve));
    assert_eq!(forged.decision, Decision::Reject);
    assert_eq!(forged.reason.as_deref(), Some("Signature mismatch for voter order-node-3"));
    assert_eq!(nodes[0].byzantine_events(), 1);
    assert_eq!(nodes[0].cluster_status().await.byzantine_events, 1);
}

#[tokio::test]
async fn forged_vote_cannot_complete_a_quorum() {
    let (net, nodes) = cluster().await;
    net.stop("order-node-2").await;
    net.tamper.write().await.insert(NodeId::from("order-node-3"), Tamper::ForgeApprove);

    let out = nodes[0].propose(create_order()).await.unwrap();
    assert_eq!(out.outcome, Outcome::Rejected);
    assert_eq!(out.approvals, 1);
}

#[tokio::test]
async fn impersonated_vote_is_byzantine() {
    let (net, nodes) = cluster().await;
    net.tamper
        .write()
        .await
        .insert(NodeId::from("order-node-3"), Tamper::Impersonate(NodeId::from("order-node-2")));

    let out = nodes[0].propose(create_order()).await.unwrap();
    let vote = out.votes.iter().find(|v| v.voter == NodeId::from("order-node-3")).unwrap();
    assert_eq!(vote.status, VoteStatus::Byzantine);
    assert_eq!(out.approvals, 2);
}

#[tokio::test]
async fn slow_peer_hits_shared_deadline() {
    let (net, nodes) = cluster().await;
    net.tamper.write().await.insert(NodeId::from("order-node-3"), Tamper::Hang);

    let started = tokio::time::Instant::now();
    let out = nodes[0].propose(create_order()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(out.outcome, Outcome::Committed);

    let slow = out.votes.iter().find(|v| v.voter == NodeId::from("order-node-3")).unwrap();
    assert_eq!(slow.status, VoteStatus::Unreachable);
}

async fn propose_with(tamper: Tamper) -> (Arc<Coordinator>, ProposalOutcome) {
    let (net, nodes) = cluster().await;
    net.tamper.write().await.insert(NodeId::from("order-node-3"), tamper);
    let out = nodes[0].propose(create_order()).await.unwrap();
    (Arc::clone(&nodes[0]), out)
}

fn vote_of<'a>(out: &'a ProposalOutcome, id: &str) -> &'a VoteRecord {
    out.votes.iter().find(|v| v.voter == NodeId::from(id)).unwrap()
}

#[tokio::test]
async fn garbage_response_is_unparseable_reject() {
    let (proposer, out) = propose_with(Tamper::Garbage).await;

    let vote = vote_of(&out, "order-node-3");
    assert_eq!(vote.status, VoteStatus::Unparseable);
    assert_eq!(vote.decision, Decision::Reject);
    assert!(vote.claimed.is_none());
    assert_eq!(out.approvals, 2);
    assert_eq!(proposer.byzantine_events(), 0);
}

#[tokio::test]
async fn vote_for_another_operation_is_unparseable_reject() {
    let (proposer, out) = propose_with(Tamper::WrongOperation).await;

    let vote = vote_of(&out, "order-node-3");
    assert_eq!(vote.status, VoteStatus::Unparseable);
    assert_eq!(vote.decision, Decision::Reject);
    assert_eq!(vote.claimed, Some(Decision::Approve));
    assert_eq!(out.approvals, 2);
    assert_eq!(proposer.byzantine_events(), 0);
}

#[tokio::test]
async fn unsigned_vote_counts_as_reject_but_not_byzantine() {
    let (proposer, out) = propose_with(Tamper::Unsigned).await;

    let vote = vote_of(&out, "order-node-3");
    assert_eq!(vote.status, VoteStatus::Unsigned);
    assert_eq!(vote.decision, Decision::Reject);
    assert_eq!(vote.claimed, Some(Decision::Approve));
    assert_eq!(out.approvals, 2);
    assert!(out.is_committed());
    assert_eq!(proposer.byzantine_events(), 0);
}

#[tokio::test]
async fn unsigned_vote_cannot_complete_a_quorum() {
    let (net, nodes) = cluster().await;
    net.stop("order-node-2").await;
    net.tamper.write().await.insert(NodeId::from("order-node-3"), Tamper::Unsigned);

    let out = nodes[0].propose(create_order()).await.unwrap();
    assert_eq!(out.outcome, Outcome::Rejected);
    assert_eq!(out.approvals, 1);
    assert_eq!(nodes[0].byzantine_events(), 0);
}

#[tokio::test]
async fn resubmission_does_not_reapply() {
    let (_net, nodes) = cluster().await;
    let op = Operation::new(create_order(), NodeId::from("order-node-1")).unwrap();

    let (a, b) = tokio::join!(nodes[0].submit(op.clone()), nodes[0].submit(op.clone()));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.operation_id, b.operation_id);
    assert!(a.is_committed() && b.is_committed());
    assert_eq!([a.replayed, b.replayed].iter().filter(|r| **r).count(), 1);

    let again = nodes[0].submit(op).await.unwrap();
    assert!(again.replayed);
    assert_eq!(nodes[0].list_orders().await.len(), 1);

    let record = nodes[0].get_operation(&again.operation_id).await.unwrap();
    assert_eq!(record.status, OperationStatus::Committed);
}

#[tokio::test]
async fn commit_replicates_to_approving_peers() {
    let (_net, nodes) = cluster().await;

    let out = nodes[0].propose(create_order()).await.unwrap();
    let order_id = out.order.unwrap().order_id;

    assert!(wait_for_order(&nodes[1], &order_id).await);
    assert!(wait_for_order(&nodes[2], &order_id).await);

    let replica = nodes[2].get_order(&order_id).await.unwrap();
    assert_eq!(replica.status, OrderStatus::Committed);
    assert_eq!(replica.created_by, NodeId::from("order-node-1"));
    let record = nodes[2].get_operation(&out.operation_id).await.unwrap();
    assert!(record.replica);

    // outro proposer enxerga o pedido replicado
    let ship = OperationPayload::UpdateStatus(UpdateStatusPayload { order_id: order_id.clone(), status: OrderStatus::Shipped });
    let shipped = nodes[1].propose(ship).await.unwrap();
    assert!(shipped.is_committed());
    assert_eq!(shipped.order.unwrap().status, OrderStatus::Shipped);
}

#[tokio::test]
async fn commit_notice_with_forged_ledger_is_refused() {
    let (_net, nodes) = cluster().await;
    let out = nodes[0].propose(create_order()).await.unwrap();
    let record = nodes[0].get_operation(&out.operation_id).await.unwrap();

    let mut votes = record.votes.clone();
    for v in votes.iter_mut() {
        v.signature = Some("00".repeat(32));
    }
    let fresh = Operation::new(create_order(), NodeId::from("order-node-1")).unwrap();
    let err = nodes[1].apply_commit(CommitNotice { operation: fresh, votes }).await.unwrap_err();
    assert_eq!(err.reason_code(), "quorum_not_reached");
}

#[tokio::test]
async fn payment_needs_unanimity() {
    let (net, nodes) = cluster().await;

    let first = nodes[0].propose(create_order()).await.unwrap().order.unwrap().order_id;
    let second = nodes[0].propose(create_order()).await.unwrap().order.unwrap().order_id;
    for id in [&first, &second] {
        assert!(wait_for_order(&nodes[1], id).await);
        assert!(wait_for_order(&nodes[2], id).await);
    }

    let pay = |order_id: &str| {
        OperationPayload::ProcessPayment(ProcessPaymentPayload { order_id: order_id.to_string(), amount: 10.0 })
    };

    let paid = nodes[0].propose(pay(&first)).await.unwrap();
    assert!(paid.is_committed());
    assert_eq!(paid.approvals, 3);
    assert!(paid.order.unwrap().payment.is_some());

    net.stop("order-node-3").await;
    let out = nodes[0].propose(pay(&second)).await.unwrap();
    assert_eq!(out.outcome, Outcome::Rejected);
    assert_eq!(out.reason, Some(RejectReason::UnanimityNotReached));
    assert_eq!((out.approvals, out.required), (2, 3));
}

#[tokio::test]
async fn invalid_payload_rejected_by_every_peer() {
    let (_net, nodes) = cluster().await;
    let ship_unknown = OperationPayload::UpdateStatus(UpdateStatusPayload {
        order_id: "ORD-missing".into(),
        status: OrderStatus::Shipped,
    });

    let out = nodes[0].propose(ship_unknown).await.unwrap();
    assert_eq!(out.outcome, Outcome::Rejected);
    assert_eq!(out.approvals, 0);
    assert!(out.votes.iter().all(|v| v.status == VoteStatus::Counted && v.reason.is_some()));
}
