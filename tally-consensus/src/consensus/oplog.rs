use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use tally_common::env::{operation::Operation, vote_data::VoteRecord};

use crate::consensus::{evaluator::DecisionRule, outcome::RejectReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    InFlight,
    Committed,
    Rejected,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationStatus::InFlight)
    }
}

/// What this node knows about one operation id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub operation: Operation,
    pub status: OperationStatus,
    pub votes: Vec<VoteRecord>,
    pub approvals: usize,
    pub required: usize,
    pub rule: DecisionRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// Applied from a peer's commit notice rather than proposed here.
    pub replica: bool,
}

/// In-memory record of decided and in-flight operations, one lock per id.
///
/// Holding the guard from [`OperationLog::lock`] across a whole round is what
/// makes resubmission of the same id observe the first decision instead of
/// running again.
#[derive(Debug, Default)]
pub struct OperationLog {
    records: RwLock<HashMap<String, OperationRecord>>,
    // só tocado fora de await; o guard limpa a entrada no Drop
    locks: SyncMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Exclusive hold on one operation id. The lock entry is dropped from the
/// log when the last holder or waiter lets go.
pub struct OperationGuard<'a> {
    log: &'a OperationLog,
    operation_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.log.locks.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(&self.operation_id)
            .map(|l| Arc::strong_count(l) == 1)
            .unwrap_or(false);
        if idle {
            locks.remove(&self.operation_id);
        }
    }
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, operation_id: &str) -> OperationGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(operation_id.to_string()).or_default())
        };
        OperationGuard { log: self, operation_id: operation_id.to_string(), guard: Some(lock.lock_owned().await) }
    }

    pub async fn get(&self, operation_id: &str) -> Option<OperationRecord> {
        self.records.read().await.get(operation_id).cloned()
    }

    /// Terminal record for `operation_id`, if one was decided.
    pub async fn decided(&self, operation_id: &str) -> Option<OperationRecord> {
        self.get(operation_id).await.filter(|r| r.status.is_terminal())
    }

    pub async fn record(&self, record: OperationRecord) {
        self.records.write().await.insert(record.operation.id.clone(), record);
    }
}
