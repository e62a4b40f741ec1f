//! Single-field reads and updates keyed by node address.

use peerlink_types::NodeAddress;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReq {
    pub id: NodeAddress,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongReq {
    pub id: NodeAddress,
    pub chain_height: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoReq {
    pub id: NodeAddress,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoAck {
    pub id: NodeAddress,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFeeReq {
    pub id: NodeAddress,
    pub fee: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePackageFeeReq {
    pub id: NodeAddress,
    pub package_fee: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHeightChangedReq {
    pub id: NodeAddress,
    pub height: u64,
}
