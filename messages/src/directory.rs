//! Registration, membership sync, and direct-dial handshake.

use peerlink_types::NodeAddress;
use serde::{Deserialize, Serialize};

use crate::NodeInfo;

/// Sent by a joining node to a bootstrap node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNodeReq {
    pub node: NodeInfo,
    /// Ask the acker to include its own sub-nodes in the reply.
    pub is_get_nodelist: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNodeAck {
    pub nodes: Vec<NodeInfo>,
}

/// A gateway reporting the full set of sub-nodes registered under it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNodeReq {
    pub gateway: NodeAddress,
    pub nodes: Vec<NodeInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNodeAck {
    pub gateway: NodeAddress,
    pub nodes: Vec<NodeInfo>,
}

/// Identifies the dialler after a direct connect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectNodeReq {
    pub node: NodeInfo,
}
