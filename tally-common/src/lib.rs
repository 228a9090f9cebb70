pub mod auth;
pub mod env;
pub mod error;
pub mod utils;

pub use error::{Result, TallyError};
pub use utils::NodeId;
