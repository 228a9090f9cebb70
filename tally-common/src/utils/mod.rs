//! utils.rs
//!
//! Common types and helper implementations shared across the tally crates.
//!
//! This module provides basic utilities such as unique node identifiers
//! and wall-clock helpers.

pub mod node_id;
pub use node_id::NodeId;

pub mod time;
