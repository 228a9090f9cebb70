//! consensus.rs
//!
//! Propose -> broadcast vote request -> tally -> commit/reject.
//!
//! The coordinator is split across files the way its responsibilities split:
//! `engine` drives a round, `voting` answers and authenticates votes, and
//! `commit` applies decided operations locally and on replicas.

mod commit;
pub mod engine;
pub mod evaluator;
pub mod oplog;
pub mod outcome;
pub mod registry;
pub mod validator;
mod voting;
