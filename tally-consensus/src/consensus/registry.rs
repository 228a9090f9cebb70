use std::collections::HashMap;

use tally_common::{env::vote_data::VoteRecord, utils::NodeId};

/// Outcome of registering a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Recorded,
    /// The voter already has a vote for this operation; the first one stands.
    Duplicate,
    /// The ballot was sealed by a decision.
    Late,
    UnknownOperation,
}

#[derive(Debug, Default, Clone)]
struct Ballot {
    votes: HashMap<NodeId, VoteRecord>,
    // ordem de chegada, para o ledger retornado ao cliente
    arrival: Vec<NodeId>,
    sealed: bool,
}

/// Armazena os votos de cada nó para cada operação em andamento.
///
/// Um voto por (operação, votante); depois de selado, nada mais entra.
#[derive(Debug, Default, Clone)]
pub struct VoteRegistry {
    ballots: HashMap<String, Ballot>,
}

impl VoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abre a urna de uma nova operação.
    pub fn register_operation(&mut self, operation_id: &str) {
        self.ballots.entry(operation_id.to_string()).or_default();
    }

    /// Registra o voto de um nó para uma operação.
    pub fn register_vote(&mut self, operation_id: &str, vote: VoteRecord) -> RegisterOutcome {
        let Some(ballot) = self.ballots.get_mut(operation_id) else {
            return RegisterOutcome::UnknownOperation;
        };
        if ballot.sealed {
            return RegisterOutcome::Late;
        }
        if ballot.votes.contains_key(&vote.voter) {
            return RegisterOutcome::Duplicate;
        }
        ballot.arrival.push(vote.voter.clone());
        ballot.votes.insert(vote.voter.clone(), vote);
        RegisterOutcome::Recorded
    }

    /// Fecha a urna; votos posteriores são ignorados.
    pub fn seal(&mut self, operation_id: &str) {
        if let Some(ballot) = self.ballots.get_mut(operation_id) {
            ballot.sealed = true;
        }
    }

    /// Votos de uma operação, na ordem de chegada.
    pub fn ledger(&self, operation_id: &str) -> Vec<VoteRecord> {
        let Some(ballot) = self.ballots.get(operation_id) else {
            return Vec::new();
        };
        ballot.arrival.iter().filter_map(|id| ballot.votes.get(id).cloned()).collect()
    }

    /// Descarta a urna depois que a decisão foi registrada no log de operações.
    pub fn remove(&mut self, operation_id: &str) -> Vec<VoteRecord> {
        let ledger = self.ledger(operation_id);
        self.ballots.remove(operation_id);
        ledger
    }
}
