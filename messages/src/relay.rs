//! Relayed payloads. `data` always holds a complete inner frame.

use peerlink_types::{NodeAddress, Priority};
use serde::{Deserialize, Serialize};

use crate::NodeInfo;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransMsgReq {
    pub dest: NodeAddress,
    pub data: Vec<u8>,
    pub priority: Priority,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMsgReq {
    /// The node that last forwarded this broadcast.
    pub from: NodeInfo,
    pub data: Vec<u8>,
    pub priority: Priority,
}
