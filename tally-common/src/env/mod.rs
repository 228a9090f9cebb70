pub mod operation;
pub mod order;
pub mod vote_data;
