//! Majority-quorum agreement over signed votes.
//!
//! A proposer broadcasts a vote request to every member of the [`ClusterView`]
//! (itself included), tallies the authenticated answers and commits to its own
//! order store when the threshold for the operation kind is met: a majority for
//! ordinary operations, every node for payments.
//!
//! Weaker than classical BFT: there is no view change and
//! no multi-round agreement, so two proposers may still commit conflicting
//! operations on the same order concurrently.

pub mod cluster;
pub mod consensus;
pub mod ports;
pub mod telemetry;

pub use cluster::health::{ClusterStatus, HealthTracker, PeerHealth};
pub use cluster::view::{ClusterView, Peer, ResolvedPeer};
pub use consensus::engine::{Coordinator, CoordinatorBuilder, CoordinatorSettings};
pub use consensus::evaluator::{ConsensusEvaluator, DecisionRule, Verdict};
pub use consensus::oplog::{OperationRecord, OperationStatus};
pub use consensus::outcome::{Outcome, ProposalOutcome, RejectReason};
pub use ports::{EndpointResolver, PeerTransport, StaticResolver};
