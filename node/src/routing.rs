//! Point-to-point routing and broadcast fan-out over the two-tier overlay.
//!
//! Public nodes form a mesh and relay for the sub-nodes registered under
//! them. A send with no live direct connection is wrapped in a
//! [`TransMsgReq`] and handed to the next hop:
//!
//! - self public, destination public: the destination itself
//! - self public, destination a sub-node: the destination's gateway
//! - self a sub-node: self's own gateway
//!
//! A gateway that is itself a sub-node is not supported.

use std::collections::HashSet;
use std::sync::Arc;

use peerlink_messages::{BroadcastMsgReq, NodeInfo, TransMsgReq};
use peerlink_network::Connection;
use peerlink_protocol::{encode_message, WireType};
use peerlink_types::{ConnectionId, EncryptMode, NodeAddress, Priority};

use crate::error::RoutingError;
use crate::metrics::NodeMetrics;
use crate::peer_directory::{Node, NodeFilter, PeerDirectory};

/// How a message left this node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Direct,
    Relayed { via: NodeAddress },
}

pub struct Router {
    directory: Arc<PeerDirectory>,
    metrics: Arc<NodeMetrics>,
}

impl Router {
    pub fn new(directory: Arc<PeerDirectory>, metrics: Arc<NodeMetrics>) -> Self {
        Self { directory, metrics }
    }

    /// Deliver an already-framed message to `dest`.
    pub fn send_to_node(
        &self,
        dest: &NodeAddress,
        frame: &[u8],
        priority: Priority,
    ) -> Result<Route, RoutingError> {
        if self.directory.is_self(dest) {
            return Err(RoutingError::SelfDestination);
        }
        let target = self.directory.find_node(dest);
        if let Some(conn) = target.as_ref().and_then(Node::live_connection) {
            conn.write(frame)?;
            return Ok(Route::Direct);
        }

        let (via, hop) = self.next_hop(dest, target.as_ref())?;
        let relay = TransMsgReq {
            dest: dest.clone(),
            data: frame.to_vec(),
            priority,
        };
        hop.write(&encode_message(&relay, priority, false, EncryptMode::None)?)?;
        self.metrics.messages_relayed.inc();
        tracing::debug!(%dest, %via, "relayed message");
        Ok(Route::Relayed { via })
    }

    /// Frame `message` and send it to `dest`.
    pub fn send_message<T: WireType>(
        &self,
        dest: &NodeAddress,
        message: &T,
        priority: Priority,
    ) -> Result<Route, RoutingError> {
        let frame = encode_message(message, priority, false, EncryptMode::None)?;
        self.send_to_node(dest, &frame, priority)
    }

    fn next_hop(
        &self,
        dest: &NodeAddress,
        target: Option<&Node>,
    ) -> Result<(NodeAddress, Arc<Connection>), RoutingError> {
        let via = if self.directory.self_is_public() {
            let target = target.ok_or_else(|| RoutingError::UnknownDestination(dest.clone()))?;
            if target.is_public_node {
                dest.clone()
            } else {
                let gateway = target
                    .public_address
                    .clone()
                    .ok_or_else(|| RoutingError::NoGateway(dest.clone()))?;
                if self.directory.is_self(&gateway) {
                    // Our own sub-node, and it is not connected.
                    return Err(RoutingError::NextHopUnavailable(dest.clone()));
                }
                gateway
            }
        } else {
            self.directory
                .self_gateway()
                .ok_or_else(|| RoutingError::NoGateway(self.directory.self_address()))?
        };

        let hop = self
            .directory
            .find_node(&via)
            .ok_or_else(|| RoutingError::NextHopUnavailable(via.clone()))?;
        if !hop.is_public_node {
            tracing::warn!(%dest, gateway = %via, "chained gateway is not supported");
            return Err(RoutingError::ChainedGateway {
                dest: dest.clone(),
                gateway: via,
            });
        }
        let conn = hop
            .live_connection()
            .ok_or_else(|| RoutingError::NextHopUnavailable(via.clone()))?;
        Ok((via, conn))
    }

    // -- Broadcast -----------------------------------------------------------

    /// Start a broadcast of `frame`. A public node sends to every public peer
    /// and its own sub-nodes; a sub-node sends only to its gateway. Returns
    /// the number of peers written to.
    pub fn broadcast(&self, frame: &[u8], priority: Priority) -> Result<usize, RoutingError> {
        let me = self.directory.self_node();
        let recipients = if me.is_public_node {
            let mut peers = self.directory.public_nodes();
            peers.extend(
                self.directory
                    .get_nodelist(&NodeFilter::SubNodesOf(me.address.clone())),
            );
            peers
        } else {
            let gateway = me
                .public_address
                .clone()
                .ok_or_else(|| RoutingError::NoGateway(me.address.clone()))?;
            self.directory.find_node(&gateway).into_iter().collect()
        };
        self.fan_out(me.to_info(), frame, priority, recipients, &HashSet::new())
    }

    /// Broadcast a message to the overlay.
    pub fn broadcast_message<T: WireType>(
        &self,
        message: &T,
        priority: Priority,
    ) -> Result<usize, RoutingError> {
        let frame = encode_message(message, priority, false, EncryptMode::None)?;
        self.broadcast(&frame, priority)
    }

    /// Pass on a broadcast received from a peer. Only public nodes forward:
    /// to their own sub-nodes always, and to the rest of the public mesh
    /// when the sender was not public. `from` is rewritten to self so that
    /// the mesh floods once.
    pub fn forward_broadcast(
        &self,
        received: &BroadcastMsgReq,
        arrived_on: &ConnectionId,
    ) -> Result<usize, RoutingError> {
        let me = self.directory.self_node();
        if !me.is_public_node {
            return Ok(0);
        }
        let mut recipients = self
            .directory
            .get_nodelist(&NodeFilter::SubNodesOf(me.address.clone()));
        if !received.from.is_public_node {
            recipients.extend(self.directory.public_nodes());
        }
        let exclude: HashSet<NodeAddress> = [received.from.address.clone()].into();
        let recipients = recipients
            .into_iter()
            .filter(|node| node.connection_id() != Some(arrived_on))
            .collect();
        self.fan_out(me.to_info(), &received.data, received.priority, recipients, &exclude)
    }

    fn fan_out(
        &self,
        from: NodeInfo,
        inner: &[u8],
        priority: Priority,
        recipients: Vec<Node>,
        exclude: &HashSet<NodeAddress>,
    ) -> Result<usize, RoutingError> {
        let envelope = BroadcastMsgReq {
            from,
            data: inner.to_vec(),
            priority,
        };
        let frame = encode_message(&envelope, priority, false, EncryptMode::None)?;

        let mut seen = HashSet::new();
        let mut sent = 0;
        for node in recipients {
            if exclude.contains(&node.address) || !seen.insert(node.address.clone()) {
                continue;
            }
            let Some(conn) = node.live_connection() else {
                continue;
            };
            match conn.write(&frame) {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::debug!(peer = %node.address, error = %e, "broadcast write skipped")
                }
            }
        }
        self.metrics.broadcasts_sent.inc_by(sent as u64);
        Ok(sent)
    }
}
