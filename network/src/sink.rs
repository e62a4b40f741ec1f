use std::sync::Arc;

use peerlink_protocol::TypedMessage;
use peerlink_types::Priority;

use crate::Connection;

/// Receives every frame a connection decodes.
pub trait FrameSink: Send + Sync {
    fn deliver(&self, priority: Priority, message: TypedMessage, connection: Arc<Connection>);
}
