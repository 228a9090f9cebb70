//! Prometheus-facing counters and gauges.
//!
//! Only the `metrics` facade is used here; the node binary installs the
//! exporter. Without a recorder installed every call is a no-op.

use metrics::{counter, gauge};

use tally_common::env::{operation::OperationKind, vote_data::VoteStatus};

pub const PROPOSALS_TOTAL: &str = "tally_proposals_total";
pub const VOTES_TOTAL: &str = "tally_votes_total";
pub const BYZANTINE_EVENTS_TOTAL: &str = "tally_byzantine_events_total";
pub const OPERATIONS_TOTAL: &str = "tally_operations_total";
pub const PEER_UNREACHABLE_TOTAL: &str = "tally_peer_unreachable_total";
pub const CLUSTER_QUORUM_AVAILABLE: &str = "tally_cluster_quorum_available";
pub const CLUSTER_HEALTHY_NODES: &str = "tally_cluster_healthy_nodes";

pub fn proposal_started(kind: OperationKind) {
    counter!(PROPOSALS_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// `decision` is the label: approve, reject or the discard status.
pub fn vote_tallied(approved: bool, status: VoteStatus) {
    let label = match (approved, status) {
        (true, _) => "approve",
        (false, VoteStatus::Counted) => "reject",
        (false, VoteStatus::Unreachable) => "unreachable",
        (false, VoteStatus::Unparseable) => "unparseable",
        (false, VoteStatus::Unsigned) => "unsigned",
        (false, VoteStatus::Byzantine) => "byzantine",
    };
    counter!(VOTES_TOTAL, "decision" => label).increment(1);
}

pub fn byzantine_event() {
    counter!(BYZANTINE_EVENTS_TOTAL).increment(1);
}

pub fn peer_unreachable() {
    counter!(PEER_UNREACHABLE_TOTAL).increment(1);
}

pub fn operation_decided(outcome: &'static str) {
    counter!(OPERATIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn cluster_health(healthy: usize, quorum_available: bool) {
    gauge!(CLUSTER_HEALTHY_NODES).set(healthy as f64);
    gauge!(CLUSTER_QUORUM_AVAILABLE).set(if quorum_available { 1.0 } else { 0.0 });
}
