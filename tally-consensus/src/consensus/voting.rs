use std::sync::atomic::Ordering;

use tracing::{error, info, warn};

use tally_common::{
    env::vote_data::{Decision, VoteRecord, VoteRequest, VoteResponse, VoteStatus},
    error::{Result, TallyError},
    utils::NodeId,
};

use crate::{
    consensus::{engine::Coordinator, validator},
    telemetry,
};

impl Coordinator {
    /// Answers a vote request: validates the payload against the local store
    /// and signs the decision.
    pub async fn cast_vote(&self, request: &VoteRequest) -> Result<VoteResponse> {
        let verdict = if !self.view.is_member(&request.proposer) {
            Err(TallyError::Validation(format!("proposer {} is not a cluster member", request.proposer)))
        } else {
            match request.decode_payload() {
                Ok(payload) => validator::validate(&payload, self.store.as_ref()).await,
                Err(e) => Err(TallyError::Validation(format!("malformed {} payload: {}", request.kind, e))),
            }
        };

        let (decision, reason) = match verdict {
            Ok(()) => (Decision::Approve, None),
            Err(e) => (Decision::Reject, Some(e.to_string())),
        };

        let voter = self.local_id().clone();
        let signature = self.auth.sign_vote(&request.operation_id, decision, &voter)?;

        info!("📝 Voto em [{}] ({}): {}", request.operation_id, request.kind, decision);
        tracing::info!(target: "consensus", "EVENT:VOTE operation_id={} kind={} voter={} decision={} signed={}", request.operation_id, request.kind, voter, decision, signature.is_some());

        Ok(VoteResponse {
            node_id: voter,
            operation_id: request.operation_id.clone(),
            decision,
            signature,
            reason,
        })
    }

    /// Turns one peer's answer into a ledger entry.
    ///
    /// Only a response that names the right operation, comes from the peer
    /// that was asked and carries a valid signature counts with its claimed
    /// decision. Everything else is a reject.
    pub(crate) fn authenticate(&self, peer: &NodeId, operation_id: &str, answer: Result<VoteResponse>) -> VoteRecord {
        let record = match answer {
            Err(TallyError::Serialization(e)) => {
                warn!("⚠️ Resposta ilegível de [{}] para {}: {}", peer, operation_id, e);
                VoteRecord::implicit_reject(peer.clone(), VoteStatus::Unparseable, format!("unparseable response: {e}"))
            }
            Err(e) => {
                warn!("⚠️ Peer [{}] não votou em {}: {}", peer, operation_id, e);
                telemetry::peer_unreachable();
                VoteRecord::implicit_reject(peer.clone(), VoteStatus::Unreachable, e.to_string())
            }
            Ok(resp) if resp.operation_id != operation_id => {
                let reason = format!("response names operation {}", resp.operation_id);
                warn!("⚠️ Resposta de [{}] para outra operação: {}", peer, reason);
                VoteRecord::discarded(resp, peer.clone(), VoteStatus::Unparseable, reason)
            }
            Ok(resp) if &resp.node_id != peer => {
                let reason = format!("identity mismatch: answer signed as {}", resp.node_id);
                self.record_byzantine(peer, operation_id, &reason);
                VoteRecord::discarded(resp, peer.clone(), VoteStatus::Byzantine, reason)
            }
            Ok(resp) if self.auth.is_degraded() => VoteRecord::counted(resp),
            Ok(resp) => match resp.signature.clone() {
                None => {
                    warn!("⚠️ Voto sem assinatura de [{}] em {}", peer, operation_id);
                    VoteRecord::discarded(resp, peer.clone(), VoteStatus::Unsigned, "unsigned vote")
                }
                Some(sig) => match self.auth.verify_vote(peer, operation_id, resp.decision, &sig) {
                    Ok(true) => VoteRecord::counted(resp),
                    Ok(false) => {
                        let reason = TallyError::SignatureMismatch { voter: peer.to_string() }.to_string();
                        self.record_byzantine(peer, operation_id, &reason);
                        VoteRecord::discarded(resp, peer.clone(), VoteStatus::Byzantine, reason)
                    }
                    Err(e) => {
                        let reason = format!("signature check failed: {e}");
                        self.record_byzantine(peer, operation_id, &reason);
                        VoteRecord::discarded(resp, peer.clone(), VoteStatus::Byzantine, reason)
                    }
                },
            },
        };

        telemetry::vote_tallied(record.is_approval(), record.status);
        tracing::info!(target: "consensus", "EVENT:RECEIVE_VOTE operation_id={} voter={} decision={} status={:?}", operation_id, record.voter, record.decision, record.status);
        record
    }

    pub(crate) fn record_byzantine(&self, voter: &NodeId, operation_id: &str, reason: &str) {
        self.byzantine_events.fetch_add(1, Ordering::Relaxed);
        telemetry::byzantine_event();
        error!(severity = "CRITICAL", "🚨 Voto bizantino de [{}] em {}: {}", voter, operation_id, reason);
        tracing::error!(target: "consensus", "EVENT:BYZANTINE operation_id={} voter={} reason=\"{}\"", operation_id, voter, reason);
    }
}
