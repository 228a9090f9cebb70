use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_common::{
    env::order::{CreateOrderPayload, LineItem, OrderStatus},
    error::{Result, TallyError},
    utils::{time, NodeId},
};

/// Order id assigned to the order created by a CREATE_ORDER operation.
///
/// Derived from the operation id so that every replica applying the same
/// commit creates the same key.
pub fn order_id_for(operation_id: &str) -> String {
    format!("ORD-{operation_id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub amount: f64,
    pub operation_id: String,
    pub paid_at: DateTime<Utc>,
}

/// An order as held in a node's store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub items: Vec<LineItem>,
    pub total: f64,
    pub status: OrderStatus,
    pub created_by: NodeId,
    pub consensus_operation_id: String,
    /// Approvals the creating operation collected.
    pub authenticated_votes: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentRecord>,
}

impl Order {
    /// Builds the order for a committed CREATE_ORDER operation.
    ///
    /// Orders only exist after a commit, so they enter the store as `committed`.
    pub fn from_commit(
        operation_id: &str,
        payload: &CreateOrderPayload,
        created_by: NodeId,
        approvals: usize,
    ) -> Self {
        Self {
            order_id: order_id_for(operation_id),
            customer_id: payload.customer_id.clone(),
            items: payload.items.clone(),
            total: payload.total(),
            status: OrderStatus::Committed,
            created_by,
            consensus_operation_id: operation_id.to_string(),
            authenticated_votes: approvals,
            created_at: time::now(),
            updated_at: None,
            updated_by: None,
            payment: None,
        }
    }

    /// Moves the order to `next` if the state machine allows it.
    pub fn transition(&mut self, next: OrderStatus, by: &NodeId) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(TallyError::IllegalTransition(format!(
                "order {} cannot move from {} to {}",
                self.order_id, self.status, next
            )));
        }
        self.status = next;
        self.touch(by);
        Ok(())
    }

    /// Records a payment. An order is paid at most once.
    pub fn record_payment(&mut self, amount: f64, operation_id: &str, by: &NodeId) -> Result<()> {
        if !self.status.accepts_payment() {
            return Err(TallyError::IllegalTransition(format!(
                "order {} in status {} does not accept payment",
                self.order_id, self.status
            )));
        }
        if self.payment.is_some() {
            return Err(TallyError::Conflict(format!("order {} is already paid", self.order_id)));
        }
        self.payment = Some(PaymentRecord {
            amount,
            operation_id: operation_id.to_string(),
            paid_at: time::now(),
        });
        self.touch(by);
        Ok(())
    }

    fn touch(&mut self, by: &NodeId) {
        self.updated_at = Some(time::now());
        self.updated_by = Some(by.clone());
    }
}
