pub mod client;

pub use client::HttpPeerTransport;
