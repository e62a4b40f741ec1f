//! The peerlink node: wires transport, dispatch, directory and routing
//! together and runs the refresh loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use peerlink_crypto::Identity;
use peerlink_messages::{
    register_all, EchoReq, NodeHeightChangedReq, PingReq, RegisterNodeReq, SyncNodeReq,
    UpdateFeeReq, UpdatePackageFeeReq,
};
use peerlink_network::{Connection, ConnectionRegistry, ListenAddr};
use peerlink_protocol::{encode_message, node_version, MessageRegistry, WireType};
use peerlink_store::HeightStore;
use peerlink_types::{EncryptMode, NodeAddress, Priority};

use crate::config::{BootstrapNode, NodeConfig};
use crate::dispatch::Dispatcher;
use crate::error::NodeError;
use crate::handlers::{ProtocolHandlers, CONTROL_PRIORITY, HEALTH_PRIORITY};
use crate::metrics::NodeMetrics;
use crate::peer_directory::{Detached, Node, NodeFilter, PeerDirectory};
use crate::routing::{Route, Router};
use crate::shutdown::ShutdownController;

/// Timeout for waiting on background tasks during shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// What one refresh round did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A registration request went out to this bootstrap node.
    Registered(String),
    /// Registration was needed but no bootstrap node answered.
    Unregistered,
    /// Public peers were re-dialled and sent a sync report.
    Synced { dialled: usize, reported: usize },
    /// A registered sub-node pinged its gateway.
    Heartbeat { sent: bool },
}

/// The parts of the node the refresh loop needs.
#[derive(Clone)]
struct Refresher {
    directory: Arc<PeerDirectory>,
    handlers: Arc<ProtocolHandlers>,
    registry: ConnectionRegistry,
    metrics: Arc<NodeMetrics>,
    bootstrap: Vec<BootstrapNode>,
}

impl Refresher {
    async fn run(
        self,
        interval: Duration,
        wake: Arc<Notify>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            let outcome = self.refresh_once().await;
            tracing::debug!(?outcome, "refresh round");
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = wake.notified() => {}
                _ = tokio::time::sleep(interval) => {}
            }
        }
        tracing::debug!("refresh loop stopped");
    }

    async fn refresh_once(&self) -> RefreshOutcome {
        self.update_gauges();
        let me = self.directory.self_node();
        let gateway = if me.is_public_node {
            None
        } else {
            me.public_address
                .as_ref()
                .and_then(|gateway| self.directory.find_node(gateway))
                .and_then(|gateway| gateway.live_connection())
        };

        if self.directory.public_count() == 0 || (!me.is_public_node && gateway.is_none()) {
            let outcome = match self.register_with_bootstrap(&me).await {
                Some(target) => RefreshOutcome::Registered(target),
                None => RefreshOutcome::Unregistered,
            };
            // Own sub-nodes still get a report while no public peer is known.
            if me.is_public_node {
                self.send_sync(&me.address);
            }
            return outcome;
        }
        if me.is_public_node {
            let dialled = self.handlers.connect_public_list().await;
            let reported = self.send_sync(&me.address);
            return RefreshOutcome::Synced { dialled, reported };
        }
        match gateway {
            Some(conn) => RefreshOutcome::Heartbeat {
                sent: self.ping(&me.address, &conn),
            },
            None => RefreshOutcome::Heartbeat { sent: false },
        }
    }

    /// Keep the gateway link from going idle. The gateway answers with a pong,
    /// so both ends see traffic every round.
    fn ping(&self, me: &NodeAddress, conn: &Connection) -> bool {
        let ping = PingReq { id: me.clone() };
        let frame = match encode_message(&ping, HEALTH_PRIORITY, false, EncryptMode::None) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "cannot encode gateway ping");
                return false;
            }
        };
        match conn.write(&frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(connection = %conn.id(), error = %e, "gateway ping not sent");
                false
            }
        }
    }

    /// Try the bootstrap list in random order; stop at the first node the
    /// request could be written to.
    async fn register_with_bootstrap(&self, me: &Node) -> Option<String> {
        let mut candidates = self.bootstrap.clone();
        candidates.shuffle(&mut rand::thread_rng());
        let request = RegisterNodeReq {
            node: me.to_info(),
            is_get_nodelist: true,
        };
        let frame = match encode_message(&request, CONTROL_PRIORITY, false, EncryptMode::None) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "cannot encode registration");
                return None;
            }
        };

        for candidate in candidates {
            let target = candidate.target();
            let conn = match self.registry.connect(&target).await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(%target, error = %e, "bootstrap node unreachable");
                    continue;
                }
            };
            match conn.write(&frame) {
                Ok(()) => {
                    tracing::info!(%target, "registration sent");
                    return Some(target.to_string());
                }
                Err(e) => {
                    tracing::warn!(%target, error = %e, "registration write failed");
                    self.registry.disconnect(conn.id());
                }
            }
        }
        if !self.bootstrap.is_empty() {
            tracing::warn!(candidates = self.bootstrap.len(), "no bootstrap node reachable");
        }
        None
    }

    /// Send this node's sub-node report to every connected public peer and
    /// every own sub-node. Returns the number of recipients.
    fn send_sync(&self, me: &NodeAddress) -> usize {
        let (gateway, nodes) = self.handlers.sync_report();
        let frame = match encode_message(
            &SyncNodeReq { gateway, nodes },
            CONTROL_PRIORITY,
            true,
            EncryptMode::None,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "cannot encode sync report");
                return 0;
            }
        };
        let mut recipients = self.directory.public_nodes();
        recipients.extend(
            self.directory
                .get_nodelist(&NodeFilter::SubNodesOf(me.clone())),
        );
        recipients
            .iter()
            .filter_map(Node::live_connection)
            .filter(|conn| conn.write(&frame).is_ok())
            .count()
    }

    fn update_gauges(&self) {
        self.metrics.connections.set(self.registry.len() as i64);
        self.metrics.known_nodes.set(self.directory.len() as i64);
        self.metrics
            .public_nodes
            .set(self.directory.public_count() as i64);
    }
}

/// A running peerlink node.
pub struct PeerNode {
    config: NodeConfig,
    store: Arc<dyn HeightStore>,
    directory: Arc<PeerDirectory>,
    registry: ConnectionRegistry,
    dispatcher: Arc<Dispatcher>,
    router: Arc<Router>,
    metrics: Arc<NodeMetrics>,
    shutdown: ShutdownController,
    refresher: Refresher,
    wake: Arc<Notify>,
    started: AtomicBool,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerNode {
    pub fn new(
        config: NodeConfig,
        identity: Arc<dyn Identity>,
        store: Arc<dyn HeightStore>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let height = store.get_height()?.unwrap_or(0);

        let address = identity.address().clone();
        let mut me = Node::new(
            identity.public_key().clone(),
            identity.sign(address.as_bytes()),
            address,
        );
        me.version = node_version(config.net);
        me.local_ip = config.local_ip;
        me.listen_port = config.listen_port;
        me.is_public_node = config.is_public_node;
        me.height = height;
        me.sign_fee = config.sign_fee;
        me.package_fee = config.package_fee;

        let mut messages = MessageRegistry::new();
        register_all(&mut messages);
        let messages = Arc::new(messages);

        let metrics = Arc::new(NodeMetrics::new());
        let directory = Arc::new(PeerDirectory::new(me));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&metrics)));
        let registry = ConnectionRegistry::new(
            Arc::clone(&messages),
            dispatcher.clone(),
            config.registry_config(),
        );
        let router = Arc::new(Router::new(Arc::clone(&directory), Arc::clone(&metrics)));
        let handlers = Arc::new(ProtocolHandlers::new(
            identity,
            Arc::clone(&directory),
            Arc::clone(&router),
            registry.clone(),
            Arc::clone(&dispatcher),
            messages,
        ));
        handlers.install()?;

        let on_close = Arc::clone(&directory);
        registry.set_disconnect_callback(move |id| match on_close.detach_connection(id) {
            Some(Detached::Public(peer)) => {
                tracing::info!(%peer, connection = %id, "public peer disconnected")
            }
            Some(Detached::SubNode(peer)) => {
                tracing::info!(%peer, connection = %id, "sub-node removed")
            }
            None => {}
        });

        let refresher = Refresher {
            directory: Arc::clone(&directory),
            handlers,
            registry: registry.clone(),
            metrics: Arc::clone(&metrics),
            bootstrap: config.bootstrap_nodes.clone(),
        };

        tracing::info!(
            address = %directory.self_address(),
            public = config.is_public_node,
            height,
            "node identity loaded"
        );
        Ok(Self {
            config,
            store,
            directory,
            registry,
            dispatcher,
            router,
            metrics,
            shutdown: ShutdownController::new(),
            refresher,
            wake: Arc::new(Notify::new()),
            started: AtomicBool::new(false),
            task_handles: Mutex::new(Vec::new()),
        })
    }

    /// Bind the listeners and start every background task. Returns the
    /// addresses actually bound.
    pub async fn start(&self) -> Result<Vec<ListenAddr>, NodeError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(NodeError::AlreadyStarted);
        }
        tracing::info!(
            address = %self.directory.self_address(),
            net = ?self.config.net,
            "peerlink node starting"
        );

        let mut bound = vec![self.registry.listen(self.config.tcp_listen_addr()).await?];
        if let Some(ListenAddr::Tcp(addr)) = bound.first() {
            let port = addr.port();
            self.directory.update_self(|me| me.listen_port = port);
        }
        if let Some(unix) = self.config.unix_listen_addr() {
            bound.push(self.registry.listen(unix).await?);
        }

        let mut handles = self.dispatcher.start(self.config.work_threads);
        handles.extend(self.registry.start(&self.shutdown.subscribe()));
        handles.push(tokio::spawn(self.refresher.clone().run(
            self.config.refresh_interval(),
            Arc::clone(&self.wake),
            self.shutdown.subscribe(),
        )));
        self.task_handles.lock().extend(handles);
        Ok(bound)
    }

    /// Run a refresh round now instead of waiting for the interval.
    pub fn refresh_now(&self) {
        self.wake.notify_one();
    }

    /// Every known node, the local node first.
    pub fn list_nodes(&self) -> Vec<Node> {
        let mut nodes = vec![self.directory.self_node()];
        let mut peers = self.directory.get_nodelist(&NodeFilter::All);
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        nodes.extend(peers);
        nodes
    }

    pub fn self_node(&self) -> Node {
        self.directory.self_node()
    }

    pub fn directory(&self) -> &Arc<PeerDirectory> {
        &self.directory
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Persist a new height and tell the overlay. A storage failure shuts
    /// the node down.
    pub fn set_self_height(&self, height: u64) -> Result<(), NodeError> {
        if let Err(e) = self.store.set_height(height) {
            tracing::error!(height, error = %e, "height store failed, shutting down");
            self.shutdown.shutdown();
            return Err(e.into());
        }
        self.directory.update_self(|me| me.height = height);
        self.broadcast_height_changed();
        Ok(())
    }

    /// Announce the local node's current height to the overlay.
    pub fn broadcast_height_changed(&self) {
        let me = self.directory.self_node();
        self.broadcast_best_effort(&NodeHeightChangedReq {
            id: me.address,
            height: me.height,
        });
    }

    pub fn broadcast_update_fee(&self, fee: u64) {
        let id = self.directory.update_self(|me| {
            me.sign_fee = fee;
            me.address.clone()
        });
        self.broadcast_best_effort(&UpdateFeeReq { id, fee });
    }

    pub fn broadcast_update_package_fee(&self, package_fee: u64) {
        let id = self.directory.update_self(|me| {
            me.package_fee = package_fee;
            me.address.clone()
        });
        self.broadcast_best_effort(&UpdatePackageFeeReq { id, package_fee });
    }

    fn broadcast_best_effort<T: WireType>(&self, message: &T) {
        match self.router.broadcast_message(message, HEALTH_PRIORITY) {
            Ok(sent) => tracing::debug!(message = T::TYPE_NAME, sent, "broadcast"),
            Err(e) => tracing::debug!(message = T::TYPE_NAME, error = %e, "broadcast not sent"),
        }
    }

    /// Broadcast an already-framed message to the overlay.
    pub fn broadcast(&self, frame: &[u8], priority: Priority) -> Result<usize, NodeError> {
        self.router
            .broadcast(frame, priority)
            .map_err(NodeError::from)
    }

    pub fn send_message_to_node<T: WireType>(
        &self,
        dest: &NodeAddress,
        message: &T,
        priority: Priority,
    ) -> Result<Route, NodeError> {
        self.router
            .send_message(dest, message, priority)
            .map_err(NodeError::from)
    }

    pub fn send_ping(&self, dest: &NodeAddress) -> Result<Route, NodeError> {
        let id = self.directory.self_address();
        self.send_message_to_node(dest, &PingReq { id }, HEALTH_PRIORITY)
    }

    pub fn send_echo(&self, dest: &NodeAddress, message: &str) -> Result<Route, NodeError> {
        let echo = EchoReq {
            id: self.directory.self_address(),
            message: message.to_string(),
        };
        self.send_message_to_node(dest, &echo, HEALTH_PRIORITY)
    }

    /// Stop every task, drop every connection, and wait for the tasks to
    /// finish.
    pub async fn stop(&self) -> Result<(), NodeError> {
        tracing::info!("peerlink node stopping");
        self.shutdown.shutdown();
        self.dispatcher.shutdown();
        self.registry.shutdown();
        self.dispatcher.clear_handlers();

        let handles: Vec<JoinHandle<()>> = self.task_handles.lock().drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
            return Err(NodeError::ShutdownTimeout);
        }
        self.refresher.update_gauges();
        tracing::info!("peerlink node stopped");
        Ok(())
    }
}
