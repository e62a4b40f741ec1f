//! Peerlink overlay node.
//!
//! The node keeps a directory of known peers, dispatches decoded frames to
//! typed handlers by priority, and routes messages across the two-tier
//! overlay:
//! - public nodes form a mesh and relay for their sub-nodes
//! - sub-nodes attach to exactly one public gateway
//! - a periodic refresh registers, re-dials and reconciles sub-node lists

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod peer_directory;
pub mod routing;
pub mod shutdown;

pub use config::{BootstrapNode, NodeConfig};
pub use dispatch::{Dispatcher, QueueEntry};
pub use error::{DirectoryError, HandlerError, NodeError, RoutingError};
pub use handlers::{dial_target, ProtocolHandlers, CONTROL_PRIORITY, HEALTH_PRIORITY};
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{PeerNode, RefreshOutcome, SHUTDOWN_TIMEOUT};
pub use peer_directory::{Detached, Node, NodeFilter, PeerDirectory};
pub use routing::{Route, Router};
pub use shutdown::ShutdownController;
