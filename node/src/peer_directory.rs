//! Peer directory: every node this node knows about, keyed by address.
//!
//! The local node is kept apart from the peer map and is never stored in
//! it. Peers point at their connection through a [`ConnectionHandle`], so a
//! dropped connection leaves a stale entry rather than a dangling one.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use parking_lot::RwLock;

use peerlink_messages::NodeInfo;
use peerlink_network::{Connection, ConnectionHandle};
use peerlink_types::{ConnectionId, NodeAddress, PublicKey, Signature};

use crate::error::DirectoryError;

/// Seconds between liveness probes. Carried in entries, not acted on yet.
pub const DEFAULT_HEART_TIME: u32 = 60;
/// Missed probes before a peer counts as gone.
pub const DEFAULT_HEART_PROBES: u32 = 6;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Node {
    pub pub_key: PublicKey,
    pub sign: Signature,
    pub address: NodeAddress,
    pub version: String,
    pub local_ip: IpAddr,
    pub listen_port: u16,
    /// As observed on the connection, not as claimed by the peer.
    pub public_ip: IpAddr,
    pub public_port: u16,
    pub connection: Option<ConnectionHandle>,
    pub is_public_node: bool,
    /// Gateway of a sub-node.
    pub public_address: Option<NodeAddress>,
    pub height: u64,
    pub sign_fee: u64,
    pub package_fee: u64,
    pub heart_time: u32,
    pub heart_probes: u32,
}

impl Node {
    pub fn new(pub_key: PublicKey, sign: Signature, address: NodeAddress) -> Self {
        Self {
            pub_key,
            sign,
            address,
            version: String::new(),
            local_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: 0,
            public_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            public_port: 0,
            connection: None,
            is_public_node: false,
            public_address: None,
            height: 0,
            sign_fee: 0,
            package_fee: 0,
            heart_time: DEFAULT_HEART_TIME,
            heart_probes: DEFAULT_HEART_PROBES,
        }
    }

    pub fn from_info(info: NodeInfo) -> Self {
        Self {
            version: info.version,
            local_ip: info.local_ip,
            listen_port: info.listen_port,
            public_ip: info.public_ip,
            public_port: info.public_port,
            is_public_node: info.is_public_node,
            public_address: info.public_address,
            height: info.height,
            sign_fee: info.sign_fee,
            package_fee: info.package_fee,
            ..Self::new(info.pub_key, info.sign, info.address)
        }
    }

    pub fn to_info(&self) -> NodeInfo {
        NodeInfo {
            pub_key: self.pub_key.clone(),
            sign: self.sign.clone(),
            address: self.address.clone(),
            public_address: self.public_address.clone(),
            version: self.version.clone(),
            local_ip: self.local_ip,
            listen_port: self.listen_port,
            public_ip: self.public_ip,
            public_port: self.public_port,
            is_public_node: self.is_public_node,
            height: self.height,
            sign_fee: self.sign_fee,
            package_fee: self.package_fee,
        }
    }

    pub fn live_connection(&self) -> Option<Arc<Connection>> {
        self.connection.as_ref().and_then(ConnectionHandle::live)
    }

    pub fn is_connected(&self) -> bool {
        self.live_connection().is_some()
    }

    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection.as_ref().map(ConnectionHandle::id)
    }

    /// Bind to `connection` and record the address it was observed from.
    pub fn bind(&mut self, connection: &Arc<Connection>) {
        if let Some(peer) = connection.peer_addr() {
            self.public_ip = peer.ip();
            self.public_port = peer.port();
        }
        self.connection = Some(ConnectionHandle::new(connection));
    }
}

/// Which peers [`PeerDirectory::get_nodelist`] returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeFilter {
    All,
    Public,
    /// Sub-nodes whose gateway is the given address.
    SubNodesOf(NodeAddress),
}

impl NodeFilter {
    fn matches(&self, node: &Node) -> bool {
        match self {
            NodeFilter::All => true,
            NodeFilter::Public => node.is_public_node,
            NodeFilter::SubNodesOf(gateway) => {
                !node.is_public_node && node.public_address.as_ref() == Some(gateway)
            }
        }
    }
}

/// What [`PeerDirectory::detach_connection`] did with the owner of a
/// closed connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Detached {
    /// A public peer, kept with its handle cleared so it can be re-dialled.
    Public(NodeAddress),
    /// A sub-node, removed.
    SubNode(NodeAddress),
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Lock order when both are needed: `nodes`, then `public`.
pub struct PeerDirectory {
    self_node: RwLock<Node>,
    nodes: RwLock<HashMap<NodeAddress, Node>>,
    public: RwLock<HashSet<NodeAddress>>,
}

impl PeerDirectory {
    pub fn new(self_node: Node) -> Self {
        Self {
            self_node: RwLock::new(self_node),
            nodes: RwLock::new(HashMap::new()),
            public: RwLock::new(HashSet::new()),
        }
    }

    // -- Self ----------------------------------------------------------------

    pub fn self_node(&self) -> Node {
        self.self_node.read().clone()
    }

    pub fn self_address(&self) -> NodeAddress {
        self.self_node.read().address.clone()
    }

    pub fn is_self(&self, address: &NodeAddress) -> bool {
        self.self_node.read().address == *address
    }

    pub fn self_is_public(&self) -> bool {
        self.self_node.read().is_public_node
    }

    /// The local node's gateway, if it is a sub-node that has registered.
    pub fn self_gateway(&self) -> Option<NodeAddress> {
        let me = self.self_node.read();
        if me.is_public_node {
            None
        } else {
            me.public_address.clone()
        }
    }

    pub fn update_self<R>(&self, update: impl FnOnce(&mut Node) -> R) -> R {
        update(&mut self.self_node.write())
    }

    // -- Peers ---------------------------------------------------------------

    fn index(&self, node: &Node) {
        let mut public = self.public.write();
        if node.is_public_node {
            public.insert(node.address.clone());
        } else {
            public.remove(&node.address);
        }
    }

    fn check_not_self(&self, address: &NodeAddress) -> Result<(), DirectoryError> {
        if self.is_self(address) {
            Err(DirectoryError::SelfEntry)
        } else {
            Ok(())
        }
    }

    /// Insert a peer that is not known yet.
    pub fn add_node(&self, node: Node) -> Result<(), DirectoryError> {
        self.check_not_self(&node.address)?;
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.address) {
            return Err(DirectoryError::Duplicate(node.address));
        }
        self.index(&node);
        nodes.insert(node.address.clone(), node);
        Ok(())
    }

    /// Replace a known peer.
    pub fn update_node(&self, node: Node) -> Result<(), DirectoryError> {
        let mut nodes = self.nodes.write();
        let Some(slot) = nodes.get_mut(&node.address) else {
            return Err(DirectoryError::NotFound(node.address));
        };
        self.index(&node);
        *slot = node;
        Ok(())
    }

    /// Insert or replace a peer learnt second-hand. An existing connection
    /// handle survives when the incoming entry has none. Returns `false` if
    /// the entry names the local node and was ignored.
    pub fn upsert_node(&self, mut node: Node) -> bool {
        if self.is_self(&node.address) {
            return false;
        }
        let mut nodes = self.nodes.write();
        if let Some(existing) = nodes.get(&node.address) {
            if node.connection.is_none() {
                node.connection = existing.connection.clone();
                node.public_ip = existing.public_ip;
                node.public_port = existing.public_port;
            }
        }
        self.index(&node);
        nodes.insert(node.address.clone(), node);
        true
    }

    /// Remove a peer. The caller owns disconnecting its connection.
    pub fn delete_node(&self, address: &NodeAddress) -> Option<Node> {
        let removed = self.nodes.write().remove(address);
        if removed.is_some() {
            self.public.write().remove(address);
        }
        removed
    }

    pub fn find_node(&self, address: &NodeAddress) -> Option<Node> {
        self.nodes.read().get(address).cloned()
    }

    pub fn find_node_by_connection(&self, id: &ConnectionId) -> Option<Node> {
        self.nodes
            .read()
            .values()
            .find(|node| node.connection_id() == Some(id))
            .cloned()
    }

    pub fn get_nodelist(&self, filter: &NodeFilter) -> Vec<Node> {
        if *filter == NodeFilter::Public {
            return self.public_nodes();
        }
        self.nodes
            .read()
            .values()
            .filter(|node| filter.matches(node))
            .cloned()
            .collect()
    }

    pub fn public_nodes(&self) -> Vec<Node> {
        let nodes = self.nodes.read();
        let public = self.public.read();
        public.iter().filter_map(|addr| nodes.get(addr).cloned()).collect()
    }

    pub fn public_count(&self) -> usize {
        self.public.read().len()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn modify<R>(
        &self,
        address: &NodeAddress,
        change: impl FnOnce(&mut Node) -> R,
    ) -> Result<R, DirectoryError> {
        self.nodes
            .write()
            .get_mut(address)
            .map(change)
            .ok_or_else(|| DirectoryError::NotFound(address.clone()))
    }

    pub fn update_node_connection(
        &self,
        address: &NodeAddress,
        connection: &Arc<Connection>,
    ) -> Result<(), DirectoryError> {
        self.modify(address, |node| node.bind(connection))
    }

    /// Applies to the local node too, so a peer's notification about this
    /// node is never an error.
    pub fn update_height(&self, address: &NodeAddress, height: u64) -> Result<(), DirectoryError> {
        if self.is_self(address) {
            self.update_self(|me| me.height = height);
            return Ok(());
        }
        self.modify(address, |node| node.height = height)
    }

    pub fn update_sign_fee(&self, address: &NodeAddress, fee: u64) -> Result<(), DirectoryError> {
        if self.is_self(address) {
            self.update_self(|me| me.sign_fee = fee);
            return Ok(());
        }
        self.modify(address, |node| node.sign_fee = fee)
    }

    pub fn update_package_fee(
        &self,
        address: &NodeAddress,
        fee: u64,
    ) -> Result<(), DirectoryError> {
        if self.is_self(address) {
            self.update_self(|me| me.package_fee = fee);
            return Ok(());
        }
        self.modify(address, |node| node.package_fee = fee)
    }

    /// Reconcile the sub-nodes registered under `gateway` with a full report
    /// from it: incoming entries are upserted, local ones it no longer lists
    /// are evicted. Returns the evicted addresses.
    pub fn replace_sub_nodes(
        &self,
        gateway: &NodeAddress,
        incoming: Vec<Node>,
    ) -> Vec<NodeAddress> {
        let reported: HashSet<NodeAddress> =
            incoming.iter().map(|node| node.address.clone()).collect();
        for node in incoming {
            self.upsert_node(node);
        }

        let stale: Vec<NodeAddress> = self
            .get_nodelist(&NodeFilter::SubNodesOf(gateway.clone()))
            .into_iter()
            .map(|node| node.address)
            .filter(|addr| !reported.contains(addr))
            .collect();
        for addr in &stale {
            self.delete_node(addr);
        }
        stale
    }

    /// React to a closed connection.
    pub fn detach_connection(&self, id: &ConnectionId) -> Option<Detached> {
        let mut nodes = self.nodes.write();
        let address = nodes
            .values()
            .find(|node| node.connection_id() == Some(id))
            .map(|node| node.address.clone())?;

        let is_public = nodes.get(&address).is_some_and(|node| node.is_public_node);
        if is_public {
            if let Some(node) = nodes.get_mut(&address) {
                node.connection = None;
            }
            Some(Detached::Public(address))
        } else {
            nodes.remove(&address);
            self.public.write().remove(&address);
            Some(Detached::SubNode(address))
        }
    }
}
