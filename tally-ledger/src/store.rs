use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use tally_common::{
    env::order::OrderStatus,
    error::{Result, TallyError},
    utils::NodeId,
};

use crate::order::Order;

/// A committed change to the order store.
#[derive(Debug, Clone)]
pub enum OrderMutation {
    Create(Order),
    Transition {
        order_id: String,
        to: OrderStatus,
        by: NodeId,
    },
    Pay {
        order_id: String,
        amount: f64,
        operation_id: String,
        by: NodeId,
    },
}

/// Keyed order storage written only by the consensus coordinator.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: &str) -> Option<Order>;

    async fn list(&self) -> Vec<Order>;

    /// Applies `mutation` under the order's lock, re-checking the state machine
    /// against the current state. Returns the order as stored afterwards.
    async fn apply(&self, mutation: OrderMutation) -> Result<Order>;
}

/// In-memory store with one lock per order id.
///
/// The outer map lock is only held to look up or insert an entry; mutations
/// of different orders never contend.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, Arc<Mutex<Order>>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, order_id: &str) -> Result<Arc<Mutex<Order>>> {
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| TallyError::NotFound(format!("order {order_id}")))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: &str) -> Option<Order> {
        let entry = self.orders.read().await.get(order_id).cloned()?;
        let order = entry.lock().await.clone();
        Some(order)
    }

    async fn list(&self) -> Vec<Order> {
        let entries: Vec<_> = self.orders.read().await.values().cloned().collect();
        let mut orders = Vec::with_capacity(entries.len());
        for entry in entries {
            orders.push(entry.lock().await.clone());
        }
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        orders
    }

    async fn apply(&self, mutation: OrderMutation) -> Result<Order> {
        match mutation {
            OrderMutation::Create(order) => {
                let mut orders = self.orders.write().await;
                if orders.contains_key(&order.order_id) {
                    return Err(TallyError::Conflict(format!("order {} already exists", order.order_id)));
                }
                info!("📦 Order [{}] stored (total {:.2})", order.order_id, order.total);
                orders.insert(order.order_id.clone(), Arc::new(Mutex::new(order.clone())));
                Ok(order)
            }
            OrderMutation::Transition { order_id, to, by } => {
                let entry = self.entry(&order_id).await?;
                let mut order = entry.lock().await;
                order.transition(to, &by)?;
                info!("🔁 Order [{}] -> {}", order_id, to);
                Ok(order.clone())
            }
            OrderMutation::Pay { order_id, amount, operation_id, by } => {
                let entry = self.entry(&order_id).await?;
                let mut order = entry.lock().await;
                order.record_payment(amount, &operation_id, &by)?;
                info!("💳 Order [{}] paid {:.2}", order_id, amount);
                Ok(order.clone())
            }
        }
    }
}
