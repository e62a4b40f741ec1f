use std::net::{IpAddr, Ipv4Addr};

use peerlink_types::{NodeAddress, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// A directory entry as it travels on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub pub_key: PublicKey,
    /// Signature of `address` by `pub_key`.
    pub sign: Signature,
    pub address: NodeAddress,
    /// Gateway of a sub-node; `None` for public nodes and unknown gateways.
    pub public_address: Option<NodeAddress>,
    pub version: String,
    pub local_ip: IpAddr,
    pub listen_port: u16,
    pub public_ip: IpAddr,
    pub public_port: u16,
    pub is_public_node: bool,
    pub height: u64,
    pub sign_fee: u64,
    pub package_fee: u64,
}

impl NodeInfo {
    /// An entry with only identity fields set, everything else zeroed.
    pub fn new(pub_key: PublicKey, sign: Signature, address: NodeAddress) -> Self {
        Self {
            pub_key,
            sign,
            address,
            public_address: None,
            version: String::new(),
            local_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: 0,
            public_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            public_port: 0,
            is_public_node: false,
            height: 0,
            sign_fee: 0,
            package_fee: 0,
        }
    }
}
