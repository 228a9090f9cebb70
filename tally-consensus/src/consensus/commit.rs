use std::collections::HashSet;

use tracing::{info, warn};

use tally_common::{
    env::vote_data::{CommitNotice, Decision, VoteRecord},
    error::{Result, TallyError},
    utils::{time, NodeId},
};

use crate::consensus::{
    engine::Coordinator,
    oplog::{OperationRecord, OperationStatus},
    outcome::RejectReason,
};

impl Coordinator {
    /// Applies a peer's committed operation to the local store.
    ///
    /// The ledger is re-checked here: only approvals from members whose
    /// signatures verify (unless this node is degraded) count, and they must
    /// meet the threshold for the kind. Applying is idempotent per operation id.
    pub async fn apply_commit(&self, notice: CommitNotice) -> Result<OperationRecord> {
        let operation = notice.operation;
        let _guard = self.oplog.lock(&operation.id).await;
        if let Some(existing) = self.oplog.decided(&operation.id).await {
            info!("♻️ Commit [{}] já aplicado, ignorando", operation.id);
            return Ok(existing);
        }

        if !self.view.is_member(&operation.proposer) {
            return Err(TallyError::Auth(format!("commit from unknown proposer {}", operation.proposer)));
        }

        let kind = operation.kind();
        let (required, rule) = self.view.required_approvals(kind);
        let approvers = self.verified_approvers(&operation.id, &notice.votes);
        if approvers.len() < required {
            warn!(
                "⚠️ Commit [{}] recusado: {}/{} aprovações verificáveis",
                operation.id,
                approvers.len(),
                required
            );
            return Err(TallyError::QuorumNotReached { approvals: approvers.len(), required });
        }

        let mutation = self.mutation_for(&operation, approvers.len());
        let (status, reason, order_id) = match self.store.apply(mutation).await {
            Ok(order) => (OperationStatus::Committed, None, Some(order.order_id)),
            Err(e) => {
                warn!("⚠️ Réplica divergente: commit [{}] não aplicado: {}", operation.id, e);
                (OperationStatus::Rejected, Some(RejectReason::ApplyConflict(e.to_string())), None)
            }
        };

        tracing::info!(target: "consensus", "EVENT:APPLY_REPLICA operation_id={} kind={} proposer={} approvals={}/{} status={:?}", operation.id, kind, operation.proposer, approvers.len(), required, status);

        let record = OperationRecord {
            operation,
            status,
            votes: notice.votes,
            approvals: approvers.len(),
            required,
            rule,
            reason,
            order_id,
            decided_at: Some(time::now()),
            replica: true,
        };
        self.finish(&record).await;
        Ok(record)
    }

    fn verified_approvers(&self, operation_id: &str, votes: &[VoteRecord]) -> HashSet<NodeId> {
        let mut approvers = HashSet::new();
        for vote in votes.iter().filter(|v| v.is_approval()) {
            if !self.view.is_member(&vote.voter) {
                continue;
            }
            if self.auth.is_degraded() {
                approvers.insert(vote.voter.clone());
                continue;
            }
            let Some(sig) = &vote.signature else {
                warn!("⚠️ Aprovação sem assinatura de [{}] no commit {}", vote.voter, operation_id);
                continue;
            };
            let valid = self
                .auth
                .verify_vote(&vote.voter, operation_id, Decision::Approve, sig)
                .unwrap_or(false);
            if valid {
                approvers.insert(vote.voter.clone());
            } else {
                let reason = TallyError::SignatureMismatch { voter: vote.voter.to_string() };
                self.record_byzantine(&vote.voter, operation_id, &format!("commit notice: {reason}"));
            }
        }
        approvers
    }
}
