//! One logical byte stream to a peer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};

use peerlink_protocol::{drain_frames, MessageRegistry};
use peerlink_types::{ConnectionId, TransportKind};

use crate::{FrameSink, NetworkError};

const READ_CHUNK: usize = 16 * 1024;

/// What the I/O tasks of a connection need from the registry.
#[derive(Clone)]
pub(crate) struct IoContext {
    pub messages: Arc<MessageRegistry>,
    pub sink: Arc<dyn FrameSink>,
    pub closed_tx: mpsc::UnboundedSender<ConnectionId>,
}

pub struct Connection {
    id: ConnectionId,
    kind: TransportKind,
    peer_addr: Option<SocketAddr>,
    connected: AtomicBool,
    last_received: Mutex<Instant>,
    read_buf: Mutex<Vec<u8>>,
    write_buf: Mutex<Vec<u8>>,
    write_ready: Notify,
    reader_stop: Notify,
}

impl Connection {
    /// A connection with no socket behind it. Writes accumulate until taken
    /// with [`Connection::take_pending_output`].
    pub fn detached(id: ConnectionId, kind: TransportKind, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            kind,
            peer_addr,
            connected: AtomicBool::new(true),
            last_received: Mutex::new(Instant::now()),
            read_buf: Mutex::new(Vec::new()),
            write_buf: Mutex::new(Vec::new()),
            write_ready: Notify::new(),
            reader_stop: Notify::new(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Remote socket address; `None` for local domain sockets.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn last_receive_age(&self) -> Duration {
        self.last_received.lock().elapsed()
    }

    /// Queue bytes for the writer task.
    pub fn write(&self, bytes: &[u8]) -> Result<(), NetworkError> {
        if !self.is_connected() {
            return Err(NetworkError::NotConnected(self.id));
        }
        self.write_buf.lock().extend_from_slice(bytes);
        self.write_ready.notify_one();
        Ok(())
    }

    /// Mark the connection dead and stop its I/O tasks. Returns `false` if it
    /// was already disconnected.
    pub fn disconnect(&self) -> bool {
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        if was_connected {
            self.reader_stop.notify_one();
            self.write_ready.notify_one();
        }
        was_connected
    }

    /// Drain whatever has been written but not yet flushed.
    pub fn take_pending_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.write_buf.lock())
    }

    /// Append inbound bytes and deliver every complete frame to `sink`.
    /// Returns the number of frames delivered.
    pub fn ingest(
        self: &Arc<Self>,
        data: &[u8],
        messages: &MessageRegistry,
        sink: &dyn FrameSink,
    ) -> usize {
        *self.last_received.lock() = Instant::now();
        let drained = {
            let mut buf = self.read_buf.lock();
            buf.extend_from_slice(data);
            drain_frames(&mut buf, messages)
        };
        for rejected in &drained.rejected {
            tracing::warn!(
                connection = %self.id,
                code = rejected.code(),
                error = %rejected,
                "dropped inbound frame"
            );
        }
        let delivered = drained.frames.len();
        for frame in drained.frames {
            tracing::debug!(
                connection = %self.id,
                message = frame.message.type_name(),
                priority = %frame.priority,
                "frame received"
            );
            sink.deliver(frame.priority, frame.message, Arc::clone(self));
        }
        delivered
    }

    pub(crate) fn spawn_io<R, W>(self: &Arc<Self>, reader: R, writer: W, ctx: IoContext)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        tokio::spawn(Arc::clone(self).read_loop(reader, ctx.clone()));
        tokio::spawn(Arc::clone(self).write_loop(writer, ctx));
    }

    async fn read_loop<R: AsyncRead + Unpin>(self: Arc<Self>, mut reader: R, ctx: IoContext) {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if !self.is_connected() {
                break;
            }
            tokio::select! {
                _ = self.reader_stop.notified() => break,
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => {
                        tracing::debug!(connection = %self.id, "closed by peer");
                        break;
                    }
                    Ok(n) => {
                        self.ingest(&chunk[..n], &ctx.messages, ctx.sink.as_ref());
                    }
                    Err(e) => {
                        tracing::warn!(connection = %self.id, error = %e, "read failed");
                        break;
                    }
                },
            }
        }
        self.disconnect();
        let _ = ctx.closed_tx.send(self.id);
    }

    async fn write_loop<W: AsyncWrite + Unpin>(self: Arc<Self>, mut writer: W, ctx: IoContext) {
        loop {
            self.write_ready.notified().await;
            let pending = self.take_pending_output();
            if !pending.is_empty() {
                let flushed = match writer.write_all(&pending).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = flushed {
                    tracing::warn!(
                        connection = %self.id,
                        bytes = pending.len(),
                        error = %e,
                        "write failed"
                    );
                    self.disconnect();
                    let _ = ctx.closed_tx.send(self.id);
                    break;
                }
            }
            if !self.is_connected() {
                let _ = writer.shutdown().await;
                break;
            }
        }
    }
}

/// A non-owning reference from a directory entry to a connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    conn: Weak<Connection>,
}

impl ConnectionHandle {
    pub fn new(connection: &Arc<Connection>) -> Self {
        Self {
            id: connection.id,
            conn: Arc::downgrade(connection),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// The connection, if it still exists and is connected.
    pub fn live(&self) -> Option<Arc<Connection>> {
        self.conn.upgrade().filter(|c| c.is_connected())
    }

    pub fn is_live(&self) -> bool {
        self.live().is_some()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerlink_protocol::{encode_message, TypedMessage, WireType};
    use peerlink_types::{EncryptMode, Priority};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe(u32);

    impl WireType for Probe {
        const TYPE_NAME: &'static str = "Probe";
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<(Priority, TypedMessage)>>);

    impl FrameSink for Collect {
        fn deliver(&self, priority: Priority, message: TypedMessage, _: Arc<Connection>) {
            self.0.lock().push((priority, message));
        }
    }

    fn messages() -> MessageRegistry {
        let mut registry = MessageRegistry::new();
        registry.register::<Probe>();
        registry
    }

    fn detached() -> Arc<Connection> {
        Arc::new(Connection::detached(
            ConnectionId::from_bytes([1; 20]),
            TransportKind::Accepted,
            None,
        ))
    }

    fn probe_frame(n: u32) -> Vec<u8> {
        encode_message(&Probe(n), Priority::HIGH_0, false, EncryptMode::None).unwrap()
    }

    #[test]
    fn writes_accumulate_until_taken() {
        let conn = detached();
        conn.write(b"ab").unwrap();
        conn.write(b"cd").unwrap();
        assert_eq!(conn.take_pending_output(), b"abcd");
        assert!(conn.take_pending_output().is_empty());
    }

    #[test]
    fn write_after_disconnect_fails() {
        let conn = detached();
        assert!(conn.disconnect());
        assert!(!conn.disconnect());
        assert!(matches!(conn.write(b"x"), Err(NetworkError::NotConnected(_))));
    }

    #[test]
    fn ingest_delivers_split_frames() {
        let conn = detached();
        let sink = Collect::default();
        let registry = messages();
        let mut bytes = probe_frame(1);
        bytes.extend_from_slice(&probe_frame(2));
        let (head, tail) = bytes.split_at(7);

        assert_eq!(conn.ingest(head, &registry, &sink), 0);
        assert_eq!(conn.ingest(tail, &registry, &sink), 2);
        let got = sink.0.lock();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, Priority::HIGH_0);
        assert_eq!(*got[1].1.downcast::<Probe>().unwrap(), Probe(2));
    }

    #[test]
    fn ingest_skips_corrupt_frame_and_keeps_going() {
        let conn = detached();
        let sink = Collect::default();
        let mut bad = probe_frame(1);
        bad[5] ^= 0x80;
        bad.extend_from_slice(&probe_frame(9));
        assert_eq!(conn.ingest(&bad, &messages(), &sink), 1);
        assert!(conn.is_connected());
        assert_eq!(*sink.0.lock()[0].1.downcast::<Probe>().unwrap(), Probe(9));
    }

    #[test]
    fn ingest_refreshes_receive_time() {
        let conn = detached();
        std::thread::sleep(Duration::from_millis(20));
        assert!(conn.last_receive_age() >= Duration::from_millis(20));
        conn.ingest(&[], &messages(), &Collect::default());
        assert!(conn.last_receive_age() < Duration::from_millis(20));
    }

    #[test]
    fn handle_goes_stale_on_disconnect_and_drop() {
        let conn = detached();
        let handle = ConnectionHandle::new(&conn);
        assert!(handle.is_live());
        conn.disconnect();
        assert!(!handle.is_live());

        let other = detached();
        let handle = ConnectionHandle::new(&other);
        drop(other);
        assert!(handle.live().is_none());
    }
}
