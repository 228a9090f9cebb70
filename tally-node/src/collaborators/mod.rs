pub mod registry;
pub mod secret_store;
