//! Local acceptance predicates, one per operation kind.
//!
//! A peer runs the predicate for the request's payload before voting. Any
//! failure becomes a `reject` whose reason travels with the vote but is not
//! part of the signed bytes.

use async_trait::async_trait;

use tally_common::{
    env::{
        operation::OperationPayload,
        order::{CancelOrderPayload, CreateOrderPayload, OrderStatus, ProcessPaymentPayload, UpdateStatusPayload},
    },
    error::{Result, TallyError},
};
use tally_ledger::{Order, OrderStore};

#[async_trait]
pub trait PayloadValidator: Send + Sync {
    async fn validate(&self, store: &dyn OrderStore) -> Result<()>;
}

/// Dispatches to the validator of the payload's kind.
pub async fn validate(payload: &OperationPayload, store: &dyn OrderStore) -> Result<()> {
    match payload {
        OperationPayload::CreateOrder(p) => p.validate(store).await,
        OperationPayload::UpdateStatus(p) => p.validate(store).await,
        OperationPayload::CancelOrder(p) => p.validate(store).await,
        OperationPayload::ProcessPayment(p) => p.validate(store).await,
    }
}

fn invalid(msg: impl Into<String>) -> TallyError {
    TallyError::Validation(msg.into())
}

async fn existing_order(store: &dyn OrderStore, order_id: &str) -> Result<Order> {
    if order_id.trim().is_empty() {
        return Err(invalid("order id is required"));
    }
    store
        .get(order_id)
        .await
        .ok_or_else(|| invalid(format!("order {order_id} not found")))
}

fn check_transition(order: &Order, next: OrderStatus) -> Result<()> {
    if order.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(invalid(format!(
            "illegal transition {} -> {} for order {}",
            order.status, next, order.order_id
        )))
    }
}

#[async_trait]
impl PayloadValidator for CreateOrderPayload {
    async fn validate(&self, _store: &dyn OrderStore) -> Result<()> {
        if self.customer_id.trim().is_empty() {
            return Err(invalid("customer id is required"));
        }
        if self.items.is_empty() {
            return Err(invalid("order must have at least one item"));
        }
        for (i, item) in self.items.iter().enumerate() {
            if item.sku.trim().is_empty() {
                return Err(invalid(format!("item {i}: sku is required")));
            }
            if item.quantity < 1 {
                return Err(invalid(format!("item {i}: quantity must be positive")));
            }
            if !item.price.is_finite() || item.price < 0.0 {
                return Err(invalid(format!("item {i}: price must be non-negative")));
            }
            if !item.subtotal().is_finite() {
                return Err(invalid(format!("item {i}: subtotal overflows")));
            }
        }
        if !self.total().is_finite() {
            return Err(invalid("order total overflows"));
        }
        Ok(())
    }
}

#[async_trait]
impl PayloadValidator for UpdateStatusPayload {
    async fn validate(&self, store: &dyn OrderStore) -> Result<()> {
        let order = existing_order(store, &self.order_id).await?;
        check_transition(&order, self.status)
    }
}

#[async_trait]
impl PayloadValidator for CancelOrderPayload {
    async fn validate(&self, store: &dyn OrderStore) -> Result<()> {
        let order = existing_order(store, &self.order_id).await?;
        check_transition(&order, OrderStatus::Cancelled)
    }
}

#[async_trait]
impl PayloadValidator for ProcessPaymentPayload {
    async fn validate(&self, store: &dyn OrderStore) -> Result<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(invalid("payment amount must be positive"));
        }
        let order = existing_order(store, &self.order_id).await?;
        if !order.status.accepts_payment() {
            return Err(invalid(format!(
                "order {} in status {} does not accept payment",
                order.order_id, order.status
            )));
        }
        if order.payment.is_some() {
            return Err(invalid(format!("order {} is already paid", order.order_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_common::{env::order::LineItem, utils::NodeId};
    use tally_ledger::{InMemoryOrderStore, OrderMutation};

    fn create(customer: &str, items: Vec<LineItem>) -> OperationPayload {
        OperationPayload::CreateOrder(CreateOrderPayload { customer_id: customer.into(), items })
    }

    fn item(qty: i64, price: f64) -> LineItem {
        LineItem { sku: "P1".into(), quantity: qty, price }
    }

    async fn store_with_order() -> (InMemoryOrderStore, String) {
        let store = InMemoryOrderStore::new();
        let payload = CreateOrderPayload { customer_id: "C1".into(), items: vec![item(1, 10.0)] };
        let order = Order::from_commit("op1", &payload, NodeId::from("n1"), 3);
        let id = order.order_id.clone();
        store.apply(OrderMutation::Create(order)).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_create_order_rules() {
        let store = InMemoryOrderStore::new();
        assert!(validate(&create("C1", vec![item(1, 10.0)]), &store).await.is_ok());
        assert!(validate(&create("C1", vec![item(1, 0.0)]), &store).await.is_ok());

        for bad in [
            create("", vec![item(1, 10.0)]),
            create("C1", vec![]),
            create("C1", vec![item(0, 10.0)]),
            create("C1", vec![item(1, -1.0)]),
            create("C1", vec![item(1, f64::NAN)]),
        ] {
            let err = validate(&bad, &store).await.unwrap_err();
            assert_eq!(err.reason_code(), "validation_failure");
        }
    }

    #[tokio::test]
    async fn test_create_order_rejects_overflowing_totals() {
        let store = InMemoryOrderStore::new();

        let err = validate(&create("C1", vec![item(10, 1e308)]), &store).await.unwrap_err();
        assert!(err.to_string().contains("subtotal"));

        // each line fits, the sum does not
        let err = validate(&create("C1", vec![item(1, 1e308), item(1, 1e308)]), &store).await.unwrap_err();
        assert!(err.to_string().contains("total"));
    }

    #[tokio::test]
    async fn test_status_and_cancel_need_existing_order() {
        let (store, id) = store_with_order().await;

        let ship = OperationPayload::UpdateStatus(UpdateStatusPayload { order_id: id.clone(), status: OrderStatus::Shipped });
        assert!(validate(&ship, &store).await.is_ok());

        let back = OperationPayload::UpdateStatus(UpdateStatusPayload { order_id: id.clone(), status: OrderStatus::Pending });
        assert!(validate(&back, &store).await.is_err());

        let cancel_missing =
            OperationPayload::CancelOrder(CancelOrderPayload { order_id: "ORD-missing".into(), reason: None });
        assert!(validate(&cancel_missing, &store).await.is_err());

        let cancel = OperationPayload::CancelOrder(CancelOrderPayload { order_id: id, reason: Some("changed mind".into()) });
        assert!(validate(&cancel, &store).await.is_ok());
    }

    #[tokio::test]
    async fn test_payment_rules() {
        let (store, id) = store_with_order().await;

        let ok = OperationPayload::ProcessPayment(ProcessPaymentPayload { order_id: id.clone(), amount: 10.0 });
        assert!(validate(&ok, &store).await.is_ok());

        let zero = OperationPayload::ProcessPayment(ProcessPaymentPayload { order_id: id.clone(), amount: 0.0 });
        assert!(validate(&zero, &store).await.is_err());

        store
            .apply(OrderMutation::Transition { order_id: id.clone(), to: OrderStatus::Cancelled, by: NodeId::from("n1") })
            .await
            .unwrap();
        assert!(validate(&ok, &store).await.is_err());
    }
}
