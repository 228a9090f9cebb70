//! State mutated by the consensus coordinator: the order model, its state
//! machine, and the per-key-locked store the coordinator writes through.

pub mod audit;
pub mod order;
pub mod store;

pub use order::{order_id_for, Order, PaymentRecord};
pub use store::{InMemoryOrderStore, OrderMutation, OrderStore};
