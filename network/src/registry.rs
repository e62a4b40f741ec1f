//! Connection registry: the single owner of live connections and listeners.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use peerlink_protocol::MessageRegistry;
use peerlink_types::{ConnectionId, TransportKind};

use crate::connection::IoContext;
use crate::{Connection, FrameSink, ListenAddr, Listener, NetworkError};

type DisconnectCallback = Arc<dyn Fn(&ConnectionId) + Send + Sync>;

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// How often the reaper runs.
    pub reap_interval: Duration,
    /// Connections silent for longer than this are evicted.
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reap_interval: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Where an outbound connection goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectTarget {
    /// TCP to a known address; IPv4 or IPv6 follows the address family.
    Addr(SocketAddr),
    /// TCP to a host name that still needs resolving.
    Host(String, u16),
    Unix(PathBuf),
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectTarget::Addr(addr) => write!(f, "{addr}"),
            ConnectTarget::Host(host, port) => write!(f, "{host}:{port}"),
            ConnectTarget::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

struct Inner {
    config: RegistryConfig,
    messages: Arc<MessageRegistry>,
    sink: Arc<dyn FrameSink>,
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    listeners: Mutex<HashMap<ListenAddr, JoinHandle<()>>>,
    on_disconnect: RwLock<Option<DisconnectCallback>>,
    closed_tx: mpsc::UnboundedSender<ConnectionId>,
    closed_rx: Mutex<Option<mpsc::UnboundedReceiver<ConnectionId>>>,
}

/// Cheap to clone; every clone shares the same registry.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl ConnectionRegistry {
    pub fn new(
        messages: Arc<MessageRegistry>,
        sink: Arc<dyn FrameSink>,
        config: RegistryConfig,
    ) -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                config,
                messages,
                sink,
                connections: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                on_disconnect: RwLock::new(None),
                closed_tx,
                closed_rx: Mutex::new(Some(closed_rx)),
            }),
        }
    }

    /// Called with the id of every connection removed from the registry.
    pub fn set_disconnect_callback<F>(&self, callback: F)
    where
        F: Fn(&ConnectionId) + Send + Sync + 'static,
    {
        *self.inner.on_disconnect.write() = Some(Arc::new(callback));
    }

    // -- Listeners ---------------------------------------------------------

    /// Bind `addr` and start accepting. Returns the address actually bound.
    pub async fn listen(&self, addr: ListenAddr) -> Result<ListenAddr, NetworkError> {
        if self.inner.listeners.lock().contains_key(&addr) {
            return Err(NetworkError::AlreadyListening(addr.to_string()));
        }
        let listener = Listener::bind(&addr).await?;
        let bound = listener.local_addr()?;

        let mut listeners = self.inner.listeners.lock();
        if listeners.contains_key(&bound) {
            return Err(NetworkError::AlreadyListening(bound.to_string()));
        }
        let task = tokio::spawn(listener.accept_loop(self.clone()));
        listeners.insert(bound.clone(), task);
        tracing::info!(addr = %bound, "listening");
        Ok(bound)
    }

    pub fn listen_addrs(&self) -> Vec<ListenAddr> {
        self.inner.listeners.lock().keys().cloned().collect()
    }

    // -- Connections -------------------------------------------------------

    pub async fn connect(&self, target: &ConnectTarget) -> Result<Arc<Connection>, NetworkError> {
        match target {
            ConnectTarget::Addr(addr) => self.connect_tcp(*addr).await,
            ConnectTarget::Host(host, port) => {
                let addr = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .ok()
                    .and_then(|mut addrs| addrs.next())
                    .ok_or_else(|| NetworkError::Resolve(target.to_string()))?;
                self.connect_tcp(addr).await
            }
            #[cfg(unix)]
            ConnectTarget::Unix(path) => {
                let stream = self
                    .with_timeout(target, tokio::net::UnixStream::connect(path))
                    .await?;
                let (reader, writer) = stream.into_split();
                self.adopt(TransportKind::Unix, None, reader, writer)
            }
            #[cfg(not(unix))]
            ConnectTarget::Unix(_) => Err(NetworkError::Unsupported("unix domain sockets")),
        }
    }

    async fn connect_tcp(&self, addr: SocketAddr) -> Result<Arc<Connection>, NetworkError> {
        let target = ConnectTarget::Addr(addr);
        let stream = self.with_timeout(&target, TcpStream::connect(addr)).await?;
        let _ = stream.set_nodelay(true);
        let kind = if addr.is_ipv4() {
            TransportKind::Tcp4
        } else {
            TransportKind::Tcp6
        };
        let (reader, writer) = stream.into_split();
        let conn = self.adopt(kind, Some(addr), reader, writer)?;
        tracing::debug!(connection = %conn.id(), peer = %addr, "connected");
        Ok(conn)
    }

    async fn with_timeout<T>(
        &self,
        target: &ConnectTarget,
        connect: impl std::future::Future<Output = std::io::Result<T>>,
    ) -> Result<T, NetworkError> {
        tokio::time::timeout(self.inner.config.connect_timeout, connect)
            .await
            .map_err(|_| NetworkError::ConnectTimeout(target.to_string()))?
            .map_err(|source| NetworkError::Connect {
                target: target.to_string(),
                source,
            })
    }

    /// Register a stream under a fresh random id and start its I/O tasks.
    pub(crate) fn adopt<R, W>(
        &self,
        kind: TransportKind,
        peer_addr: Option<SocketAddr>,
        reader: R,
        writer: W,
    ) -> Result<Arc<Connection>, NetworkError>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let id = ConnectionId::from_bytes(rand::random());
        let conn = Arc::new(Connection::detached(id, kind, peer_addr));
        self.insert(Arc::clone(&conn))?;
        conn.spawn_io(reader, writer, self.io_context());
        Ok(conn)
    }

    /// Track a connection created elsewhere.
    pub fn insert(&self, conn: Arc<Connection>) -> Result<(), NetworkError> {
        let mut connections = self.inner.connections.lock();
        if connections.contains_key(conn.id()) {
            return Err(NetworkError::DuplicateId(*conn.id()));
        }
        connections.insert(*conn.id(), conn);
        Ok(())
    }

    fn io_context(&self) -> IoContext {
        IoContext {
            messages: Arc::clone(&self.inner.messages),
            sink: Arc::clone(&self.inner.sink),
            closed_tx: self.inner.closed_tx.clone(),
        }
    }

    /// Remove a connection. A miss is not an error; the callback only runs
    /// when something was actually removed.
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        let removed = self.inner.connections.lock().remove(id);
        let Some(conn) = removed else {
            return false;
        };
        conn.disconnect();
        tracing::debug!(connection = %id, kind = %conn.kind(), "connection removed");

        let callback = self.inner.on_disconnect.read().clone();
        if let Some(callback) = callback {
            callback(id);
        }
        true
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.inner.connections.lock().get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner.connections.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.connections.lock().is_empty()
    }

    // -- Background loops --------------------------------------------------

    /// Spawn the close-event loop and the reaper. Both stop when `shutdown`
    /// fires. Calling this twice only starts the reaper again.
    pub fn start(&self, shutdown: &broadcast::Receiver<()>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);
        if let Some(closed_rx) = self.inner.closed_rx.lock().take() {
            handles.push(tokio::spawn(
                self.clone().event_loop(closed_rx, shutdown.resubscribe()),
            ));
        }
        handles.push(tokio::spawn(self.clone().reap_loop(shutdown.resubscribe())));
        handles
    }

    async fn event_loop(
        self,
        mut closed_rx: mpsc::UnboundedReceiver<ConnectionId>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                closed = closed_rx.recv() => match closed {
                    Some(id) => {
                        self.disconnect(&id);
                    }
                    None => break,
                },
            }
        }
    }

    async fn reap_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.inner.config.reap_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    let evicted = self.reap();
                    if evicted > 0 {
                        tracing::info!(evicted, remaining = self.len(), "reaped connections");
                    }
                }
            }
        }
    }

    /// Evict every connection that is disconnected or idle past the limit.
    pub fn reap(&self) -> usize {
        let idle_timeout = self.inner.config.idle_timeout;
        self.snapshot()
            .into_iter()
            .filter(|conn| !conn.is_connected() || conn.last_receive_age() > idle_timeout)
            .filter(|conn| self.disconnect(conn.id()))
            .count()
    }

    /// Stop every listener and drop every connection.
    pub fn shutdown(&self) {
        for (addr, task) in self.inner.listeners.lock().drain() {
            task.abort();
            tracing::debug!(addr = %addr, "listener stopped");
        }
        for conn in self.snapshot() {
            self.disconnect(conn.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use peerlink_protocol::{encode_message, TypedMessage, WireType};
    use peerlink_types::{EncryptMode, Priority};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe(String);

    impl WireType for Probe {
        const TYPE_NAME: &'static str = "Probe";
    }

    struct ChannelSink(mpsc::UnboundedSender<(TypedMessage, ConnectionId)>);

    impl FrameSink for ChannelSink {
        fn deliver(&self, _: Priority, message: TypedMessage, connection: Arc<Connection>) {
            let _ = self.0.send((message, *connection.id()));
        }
    }

    fn registry_with(
        config: RegistryConfig,
    ) -> (
        ConnectionRegistry,
        mpsc::UnboundedReceiver<(TypedMessage, ConnectionId)>,
    ) {
        let mut messages = MessageRegistry::new();
        messages.register::<Probe>();
        let (tx, rx) = mpsc::unbounded_channel();
        let registry =
            ConnectionRegistry::new(Arc::new(messages), Arc::new(ChannelSink(tx)), config);
        (registry, rx)
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn loopback() -> ListenAddr {
        ListenAddr::Tcp("127.0.0.1:0".parse().unwrap())
    }

    fn target_for(bound: &ListenAddr) -> ConnectTarget {
        match bound {
            ListenAddr::Tcp(addr) => ConnectTarget::Addr(*addr),
            ListenAddr::Unix(path) => ConnectTarget::Unix(path.clone()),
        }
    }

    #[tokio::test]
    async fn frames_flow_from_client_to_accepted_side() {
        let (registry, mut rx) = registry_with(RegistryConfig::default());
        let bound = registry.listen(loopback()).await.unwrap();
        let client = registry.connect(&target_for(&bound)).await.unwrap();
        assert_eq!(client.kind(), TransportKind::Tcp4);

        let frame =
            encode_message(&Probe("hi".into()), Priority::LOW_0, false, EncryptMode::None).unwrap();
        client.write(&frame).unwrap();

        let (message, from) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.downcast::<Probe>().unwrap().0, "hi");
        assert_ne!(from, *client.id());
        assert_eq!(registry.get(&from).unwrap().kind(), TransportKind::Accepted);
    }

    #[tokio::test]
    async fn duplicate_listen_rejected() {
        let (registry, _rx) = registry_with(RegistryConfig::default());
        let bound = registry.listen(loopback()).await.unwrap();
        assert!(matches!(
            registry.listen(bound).await,
            Err(NetworkError::AlreadyListening(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_fires_callback_once() {
        let (registry, _rx) = registry_with(RegistryConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        registry.set_disconnect_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let conn = Arc::new(Connection::detached(
            ConnectionId::from_bytes([4; 20]),
            TransportKind::Accepted,
            None,
        ));
        registry.insert(Arc::clone(&conn)).unwrap();
        assert!(matches!(
            registry.insert(Arc::clone(&conn)),
            Err(NetworkError::DuplicateId(_))
        ));

        assert!(registry.disconnect(conn.id()));
        assert!(!registry.disconnect(conn.id()));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn reap_evicts_dead_and_idle_connections() {
        let (registry, _rx) = registry_with(RegistryConfig {
            idle_timeout: Duration::from_millis(50),
            ..RegistryConfig::default()
        });
        let dead = Arc::new(Connection::detached(
            ConnectionId::from_bytes([1; 20]),
            TransportKind::Accepted,
            None,
        ));
        dead.disconnect();
        registry.insert(dead).unwrap();
        assert_eq!(registry.reap(), 1);

        let idle = Arc::new(Connection::detached(
            ConnectionId::from_bytes([2; 20]),
            TransportKind::Accepted,
            None,
        ));
        registry.insert(idle).unwrap();
        assert_eq!(registry.reap(), 0);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(registry.reap(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn reaper_task_runs_on_interval() {
        let (registry, _rx) = registry_with(RegistryConfig {
            reap_interval: Duration::from_millis(20),
            ..RegistryConfig::default()
        });
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handles = registry.start(&shutdown_rx);

        let conn = Arc::new(Connection::detached(
            ConnectionId::from_bytes([3; 20]),
            TransportKind::Accepted,
            None,
        ));
        registry.insert(Arc::clone(&conn)).unwrap();
        conn.disconnect();
        let r = registry.clone();
        wait_for(move || r.is_empty()).await;

        shutdown_tx.send(()).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn peer_close_removes_both_ends() {
        let (registry, _rx) = registry_with(RegistryConfig::default());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        registry.start(&shutdown_rx);
        let bound = registry.listen(loopback()).await.unwrap();
        let client = registry.connect(&target_for(&bound)).await.unwrap();
        let r = registry.clone();
        wait_for(move || r.len() == 2).await;

        registry.disconnect(client.id());
        let r = registry.clone();
        wait_for(move || r.is_empty()).await;
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let (registry, _rx) = registry_with(RegistryConfig::default());
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let target = ConnectTarget::Addr(SocketAddr::from(([127, 0, 0, 1], port)));
        assert!(registry.connect(&target).await.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_host_fails() {
        let (registry, _rx) = registry_with(RegistryConfig::default());
        let target = ConnectTarget::Host("no-such-host.invalid".into(), 1);
        assert!(registry.connect(&target).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_domain_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, mut rx) = registry_with(RegistryConfig::default());
        let bound = registry
            .listen(ListenAddr::Unix(dir.path().join("peer.sock")))
            .await
            .unwrap();
        let client = registry.connect(&target_for(&bound)).await.unwrap();
        assert_eq!(client.kind(), TransportKind::Unix);

        let frame =
            encode_message(&Probe("local".into()), Priority::HIGH_2, true, EncryptMode::None)
                .unwrap();
        client.write(&frame).unwrap();
        let (message, _) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.downcast::<Probe>().unwrap().0, "local");
    }

    #[tokio::test]
    async fn shutdown_clears_everything() {
        let (registry, _rx) = registry_with(RegistryConfig::default());
        let bound = registry.listen(loopback()).await.unwrap();
        let _client = registry.connect(&target_for(&bound)).await.unwrap();
        registry.shutdown();
        assert!(registry.listen_addrs().is_empty());
        assert!(registry.is_empty());
    }
}
