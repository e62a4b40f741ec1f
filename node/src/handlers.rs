//! Handlers for every message in `peerlink_messages`.
//!
//! Each handler runs on a dispatch worker with no lock held and returns
//! `Ok(())` or a [`HandlerError`]. Errors only reach the log; the protocol
//! has no error replies.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use peerlink_crypto::Identity;
use peerlink_messages::{
    BroadcastMsgReq, ConnectNodeReq, EchoAck, EchoReq, NodeHeightChangedReq, NodeInfo, PingReq,
    PongReq, RegisterNodeAck, RegisterNodeReq, SyncNodeAck, SyncNodeReq, TransMsgReq,
    UpdateFeeReq, UpdatePackageFeeReq,
};
use peerlink_network::{ConnectTarget, Connection, ConnectionRegistry};
use peerlink_protocol::{decode_frame, encode_message, Decoded, MessageRegistry, WireType};
use peerlink_types::{EncryptMode, NodeAddress, Priority};

use crate::dispatch::Dispatcher;
use crate::error::HandlerError;
use crate::peer_directory::{Node, NodeFilter, PeerDirectory};
use crate::routing::Router;

/// Priority of directory maintenance traffic.
pub const CONTROL_PRIORITY: Priority = Priority::HIGH_2;
/// Priority of health and fee traffic.
pub const HEALTH_PRIORITY: Priority = Priority::MIDDLE_1;

pub struct ProtocolHandlers {
    identity: Arc<dyn Identity>,
    directory: Arc<PeerDirectory>,
    router: Arc<Router>,
    registry: ConnectionRegistry,
    dispatcher: Arc<Dispatcher>,
    messages: Arc<MessageRegistry>,
}

fn reply<T: WireType>(
    conn: &Connection,
    message: &T,
    priority: Priority,
) -> Result<(), HandlerError> {
    conn.write(&encode_message(message, priority, false, EncryptMode::None)?)?;
    Ok(())
}

/// Where to dial a node: its observed address when known, else its own claim.
pub fn dial_target(node: &Node) -> ConnectTarget {
    let ip = if node.public_ip.is_unspecified() {
        node.local_ip
    } else {
        node.public_ip
    };
    ConnectTarget::Addr(SocketAddr::new(ip, node.listen_port))
}

impl ProtocolHandlers {
    pub fn new(
        identity: Arc<dyn Identity>,
        directory: Arc<PeerDirectory>,
        router: Arc<Router>,
        registry: ConnectionRegistry,
        dispatcher: Arc<Dispatcher>,
        messages: Arc<MessageRegistry>,
    ) -> Self {
        Self {
            identity,
            directory,
            router,
            registry,
            dispatcher,
            messages,
        }
    }

    fn route<T, F, Fut>(self: &Arc<Self>, handler: F) -> Result<(), HandlerError>
    where
        T: WireType,
        F: Fn(Arc<Self>, Arc<T>, Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let this = Arc::clone(self);
        self.dispatcher.register_handler::<T, _, _>(move |message, conn| {
            handler(Arc::clone(&this), message, conn)
        })
    }

    /// Register a handler for every message type with the dispatcher.
    pub fn install(self: &Arc<Self>) -> Result<(), HandlerError> {
        self.route::<RegisterNodeReq, _, _>(|h, m, c| async move { h.on_register(&m, &c) })?;
        self.route::<RegisterNodeAck, _, _>(|h, m, c| async move {
            let result = h.on_register_ack(&m, &c);
            if result.is_ok() {
                h.connect_public_list().await;
            }
            result
        })?;
        self.route::<SyncNodeReq, _, _>(|h, m, c| async move { h.on_sync_req(&m, &c) })?;
        self.route::<SyncNodeAck, _, _>(|h, m, c| async move {
            h.apply_sync(&m.gateway, &m.nodes, &c).map(|_| ())
        })?;
        self.route::<ConnectNodeReq, _, _>(|h, m, c| async move { h.on_connect(&m, &c) })?;
        self.route::<TransMsgReq, _, _>(|h, m, c| async move { h.on_trans_msg(&m, c) })?;
        self.route::<BroadcastMsgReq, _, _>(|h, m, c| async move { h.on_broadcast(&m, c) })?;
        self.route::<PingReq, _, _>(|h, _, c| async move { h.on_ping(&c) })?;
        self.route::<PongReq, _, _>(|h, m, _| async move {
            h.directory
                .update_height(&m.id, m.chain_height)
                .map_err(HandlerError::from)
        })?;
        self.route::<EchoReq, _, _>(|h, m, c| async move { h.on_echo(&m, &c) })?;
        self.route::<EchoAck, _, _>(|_, m, c| async move {
            tracing::info!(from = %m.id, connection = %c.id(), message = %m.message, "echo reply");
            Ok(())
        })?;
        self.route::<UpdateFeeReq, _, _>(|h, m, _| async move {
            h.directory
                .update_sign_fee(&m.id, m.fee)
                .map_err(HandlerError::from)
        })?;
        self.route::<UpdatePackageFeeReq, _, _>(|h, m, _| async move {
            h.directory
                .update_package_fee(&m.id, m.package_fee)
                .map_err(HandlerError::from)
        })?;
        self.route::<NodeHeightChangedReq, _, _>(|h, m, _| async move {
            h.directory
                .update_height(&m.id, m.height)
                .map_err(HandlerError::from)
        })?;
        Ok(())
    }

    // -- Identity ------------------------------------------------------------

    fn verify_identity(&self, info: &NodeInfo) -> Result<(), HandlerError> {
        if self.directory.is_self(&info.address) {
            return Err(HandlerError::SelfRegistration);
        }
        if self.identity.derive_address(&info.pub_key) != info.address {
            return Err(HandlerError::AddressMismatch(info.address.clone()));
        }
        if !self
            .identity
            .verify(&info.pub_key, info.address.as_bytes(), &info.sign)
        {
            return Err(HandlerError::BadSignature(info.address.clone()));
        }
        Ok(())
    }

    /// An entry for a verified peer bound to `conn`. A connected entry for
    /// the same address is a duplicate; a stale one gets replaced.
    fn admit(&self, info: &NodeInfo, conn: &Arc<Connection>) -> Result<Node, HandlerError> {
        self.verify_identity(info)?;
        if let Some(existing) = self.directory.find_node(&info.address) {
            if existing.is_connected() && existing.connection_id() != Some(conn.id()) {
                return Err(HandlerError::Duplicate(info.address.clone()));
            }
        }
        let mut node = Node::from_info(info.clone());
        node.bind(conn);
        Ok(node)
    }

    // -- Register ------------------------------------------------------------

    pub fn on_register(
        &self,
        req: &RegisterNodeReq,
        conn: &Arc<Connection>,
    ) -> Result<(), HandlerError> {
        let mut node = self.admit(&req.node, conn)?;
        let me = self.directory.self_node();
        node.public_address = if node.is_public_node {
            None
        } else if me.is_public_node {
            Some(me.address.clone())
        } else {
            me.public_address.clone()
        };
        let requester = node.to_info();
        self.directory.upsert_node(node);

        // The acker always lists itself first.
        let mut nodes = vec![me.to_info()];
        nodes.extend(
            self.directory
                .public_nodes()
                .iter()
                .filter(|n| n.address != requester.address)
                .map(Node::to_info),
        );
        if req.is_get_nodelist && me.is_public_node {
            nodes.extend(
                self.directory
                    .get_nodelist(&NodeFilter::SubNodesOf(me.address.clone()))
                    .iter()
                    .filter(|n| n.address != requester.address)
                    .map(Node::to_info),
            );
        }
        tracing::info!(
            peer = %requester.address,
            public = requester.is_public_node,
            observed = %SocketAddr::new(requester.public_ip, requester.public_port),
            listed = nodes.len(),
            "node registered"
        );
        nodes.push(requester);
        reply(conn, &RegisterNodeAck { nodes }, CONTROL_PRIORITY)
    }

    /// Adopt what the acker observed about this node and learn the rest.
    pub fn on_register_ack(
        &self,
        ack: &RegisterNodeAck,
        conn: &Arc<Connection>,
    ) -> Result<(), HandlerError> {
        let me = self.directory.self_address();
        let own_entry = ack.nodes.iter().find(|info| info.address == me);
        let acker = ack
            .nodes
            .first()
            .map(|info| info.address.clone())
            .filter(|address| *address != me);
        if let Some(info) = own_entry {
            self.directory.update_self(|node| {
                if !node.is_public_node {
                    node.public_address = info.public_address.clone();
                }
                node.public_ip = info.public_ip;
                node.public_port = info.public_port;
            });
        }

        for info in ack.nodes.iter().filter(|info| info.address != me) {
            let mut node = Node::from_info(info.clone());
            if acker.as_ref() == Some(&info.address) {
                node.bind(conn);
            }
            self.directory.upsert_node(node);
        }
        tracing::info!(
            gateway = ?self.directory.self_gateway(),
            learnt = ack.nodes.len().saturating_sub(1),
            "registration acknowledged"
        );
        Ok(())
    }

    /// Dial every public node without a live connection and introduce this
    /// node to it. Sub-nodes only ever talk to their gateway, so this does
    /// nothing unless self is public. Returns the number of new connections.
    pub async fn connect_public_list(&self) -> usize {
        if !self.directory.self_is_public() {
            return 0;
        }
        let hello = ConnectNodeReq {
            node: self.directory.self_node().to_info(),
        };
        let mut connected = 0;
        for node in self.directory.public_nodes() {
            if node.is_connected() || self.directory.is_self(&node.address) {
                continue;
            }
            let target = dial_target(&node);
            let conn = match self.registry.connect(&target).await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(peer = %node.address, %target, error = %e, "dial failed");
                    continue;
                }
            };
            if self
                .directory
                .update_node_connection(&node.address, &conn)
                .is_err()
            {
                self.registry.disconnect(conn.id());
                continue;
            }
            match reply(&conn, &hello, CONTROL_PRIORITY) {
                Ok(()) => connected += 1,
                Err(e) => {
                    tracing::warn!(peer = %node.address, error = %e, "connect request failed")
                }
            }
        }
        connected
    }

    // -- Sync ----------------------------------------------------------------

    /// Reconcile sub-nodes reported by `gateway`. Reports about this node's
    /// own sub-nodes are ignored; only this node is authoritative for them.
    /// The report must arrive on the connection bound to `gateway`, and only
    /// public gateways are believed.
    pub fn apply_sync(
        &self,
        gateway: &NodeAddress,
        nodes: &[NodeInfo],
        conn: &Connection,
    ) -> Result<Vec<NodeAddress>, HandlerError> {
        if self.directory.is_self(gateway) {
            return Ok(Vec::new());
        }
        let reporter = self
            .directory
            .find_node_by_connection(conn.id())
            .filter(|node| node.address == *gateway)
            .ok_or_else(|| HandlerError::UnverifiedReporter(gateway.clone()))?;
        if !reporter.is_public_node {
            tracing::debug!(%gateway, "ignored sync report from a sub-node");
            return Ok(Vec::new());
        }
        let incoming: Vec<Node> = nodes
            .iter()
            .filter(|info| !self.directory.is_self(&info.address))
            .map(|info| {
                let mut node = Node::from_info(info.clone());
                if !node.is_public_node {
                    node.public_address = Some(gateway.clone());
                }
                node
            })
            .collect();
        let evicted = self.directory.replace_sub_nodes(gateway, incoming);
        if !evicted.is_empty() {
            tracing::info!(%gateway, evicted = evicted.len(), "evicted stale sub-nodes");
        }
        Ok(evicted)
    }

    /// This node's current sub-node report.
    pub fn sync_report(&self) -> (NodeAddress, Vec<NodeInfo>) {
        let me = self.directory.self_address();
        let nodes = self
            .directory
            .get_nodelist(&NodeFilter::SubNodesOf(me.clone()))
            .iter()
            .map(Node::to_info)
            .collect();
        (me, nodes)
    }

    pub fn on_sync_req(
        &self,
        req: &SyncNodeReq,
        conn: &Arc<Connection>,
    ) -> Result<(), HandlerError> {
        self.apply_sync(&req.gateway, &req.nodes, conn)?;
        if !self.directory.self_is_public() {
            return Ok(());
        }
        let (gateway, nodes) = self.sync_report();
        reply(conn, &SyncNodeAck { gateway, nodes }, CONTROL_PRIORITY)
    }

    // -- Connect -------------------------------------------------------------

    pub fn on_connect(
        &self,
        req: &ConnectNodeReq,
        conn: &Arc<Connection>,
    ) -> Result<(), HandlerError> {
        let node = self.admit(&req.node, conn)?;
        tracing::info!(peer = %node.address, public = node.is_public_node, "peer connected");
        self.directory.upsert_node(node);
        Ok(())
    }

    // -- Relay ---------------------------------------------------------------

    /// Decode an embedded frame and queue it as if it had arrived on `conn`.
    fn dispatch_inner(&self, frame: &[u8], conn: Arc<Connection>) -> Result<(), HandlerError> {
        match decode_frame(frame, &self.messages)? {
            Decoded::Frame(inner) => {
                self.dispatcher.submit(inner.priority, inner.message, conn);
                Ok(())
            }
            Decoded::Incomplete => Err(HandlerError::IncompleteFrame),
        }
    }

    pub fn on_trans_msg(
        &self,
        req: &TransMsgReq,
        conn: Arc<Connection>,
    ) -> Result<(), HandlerError> {
        if self.directory.is_self(&req.dest) {
            return self.dispatch_inner(&req.data, conn);
        }
        let route = self.router.send_to_node(&req.dest, &req.data, req.priority)?;
        tracing::debug!(dest = %req.dest, ?route, "forwarded relay");
        Ok(())
    }

    pub fn on_broadcast(
        &self,
        req: &BroadcastMsgReq,
        conn: Arc<Connection>,
    ) -> Result<(), HandlerError> {
        let arrived_on = *conn.id();
        self.dispatch_inner(&req.data, conn)?;
        self.router.forward_broadcast(req, &arrived_on)?;
        Ok(())
    }

    // -- Health --------------------------------------------------------------

    pub fn on_ping(&self, conn: &Arc<Connection>) -> Result<(), HandlerError> {
        let me = self.directory.self_node();
        let pong = PongReq {
            id: me.address,
            chain_height: me.height,
        };
        reply(conn, &pong, HEALTH_PRIORITY)
    }

    pub fn on_echo(&self, req: &EchoReq, conn: &Arc<Connection>) -> Result<(), HandlerError> {
        let ack = EchoAck {
            id: self.directory.self_address(),
            message: req.message.clone(),
        };
        reply(conn, &ack, HEALTH_PRIORITY)
    }
}
