pub mod api;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod rpc;
pub mod runtime;
pub mod telemetry;

pub use config::Config;
pub use runtime::builder::build_runtime;
