//! HTTP diagnostic endpoint for the peerlink node.
//!
//! Provides:
//! - `GET /info`: every known node as plain text, the local node first
//! - `GET /nodes`: the same list as JSON
//! - `GET /metrics`: Prometheus metrics

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::DiagnosticServer;
