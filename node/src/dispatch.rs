//! Priority dispatch pipeline.
//!
//! Every decoded frame lands in one shared max-heap keyed on its 4-bit
//! priority. N worker tasks pop the highest entry and run the handler
//! registered for its type name. Entries of equal priority come out in no
//! particular order; the heap carries no sequence number.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use peerlink_network::{Connection, FrameSink};
use peerlink_protocol::{TypedMessage, WireType};
use peerlink_types::Priority;

use crate::error::HandlerError;
use crate::metrics::NodeMetrics;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;
type HandlerFn = Arc<dyn Fn(TypedMessage, Arc<Connection>) -> Option<HandlerFuture> + Send + Sync>;

/// One queued message, consumed by exactly one worker.
pub struct QueueEntry {
    pub priority: Priority,
    pub message: TypedMessage,
    pub connection: Arc<Connection>,
}

impl Eq for QueueEntry {}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority)
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

pub struct Dispatcher {
    queue: Mutex<BinaryHeap<QueueEntry>>,
    handlers: RwLock<HashMap<&'static str, HandlerFn>>,
    notify: Notify,
    running: AtomicBool,
    stop_tx: broadcast::Sender<()>,
    metrics: Arc<NodeMetrics>,
}

impl Dispatcher {
    pub fn new(metrics: Arc<NodeMetrics>) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            queue: Mutex::new(BinaryHeap::new()),
            handlers: RwLock::new(HashMap::new()),
            notify: Notify::new(),
            running: AtomicBool::new(false),
            stop_tx,
            metrics,
        }
    }

    /// Route every `T` to `handler`. One handler per type.
    pub fn register_handler<T, F, Fut>(&self, handler: F) -> Result<(), HandlerError>
    where
        T: WireType,
        F: Fn(Arc<T>, Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(T::TYPE_NAME) {
            return Err(HandlerError::AlreadyRegistered(T::TYPE_NAME));
        }
        let erased: HandlerFn = Arc::new(move |message: TypedMessage, connection: Arc<Connection>| {
            message
                .downcast::<T>()
                .map(|body| Box::pin(handler(body, connection)) as HandlerFuture)
        });
        handlers.insert(T::TYPE_NAME, erased);
        Ok(())
    }

    pub fn has_handler(&self, type_name: &str) -> bool {
        self.handlers.read().contains_key(type_name)
    }

    /// Drop every handler. Handlers usually capture node state that in turn
    /// holds this dispatcher, so this is what lets a stopped node be freed.
    pub fn clear_handlers(&self) {
        self.handlers.write().clear();
    }

    /// Queue a message and wake one idle worker.
    pub fn submit(&self, priority: Priority, message: TypedMessage, connection: Arc<Connection>) {
        let depth = {
            let mut queue = self.queue.lock();
            queue.push(QueueEntry {
                priority,
                message,
                connection,
            });
            queue.len()
        };
        self.metrics.dispatch_queue_depth.set(depth as i64);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn `workers` tasks. Calling this on a running dispatcher does nothing.
    pub fn start(self: &Arc<Self>, workers: usize) -> Vec<JoinHandle<()>> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        (0..workers.max(1))
            .map(|worker| {
                let stop_rx = self.stop_tx.subscribe();
                tokio::spawn(Arc::clone(self).worker_loop(worker, stop_rx))
            })
            .collect()
    }

    /// Stop the workers. Whatever is still queued is discarded.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            let _ = self.stop_tx.send(());
            self.notify.notify_waiters();
        }
        let discarded = std::mem::take(&mut *self.queue.lock()).len();
        if discarded > 0 {
            tracing::debug!(discarded, "dispatch queue discarded on shutdown");
        }
        self.metrics.dispatch_queue_depth.set(0);
    }

    pub(crate) fn pop(&self) -> Option<QueueEntry> {
        let mut queue = self.queue.lock();
        let entry = queue.pop();
        self.metrics.dispatch_queue_depth.set(queue.len() as i64);
        entry
    }

    async fn worker_loop(self: Arc<Self>, worker: usize, mut stop_rx: broadcast::Receiver<()>) {
        tracing::debug!(worker, "dispatch worker started");
        loop {
            if !self.is_running() {
                break;
            }
            match self.pop() {
                Some(entry) => self.dispatch(entry).await,
                None => {
                    tokio::select! {
                        _ = stop_rx.recv() => break,
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
        tracing::debug!(worker, "dispatch worker stopped");
    }

    /// Run the handler for one entry. Errors are logged, never returned to
    /// the sender.
    pub async fn dispatch(&self, entry: QueueEntry) {
        let type_name = entry.message.type_name();
        let connection = *entry.connection.id();
        let handler = self.handlers.read().get(type_name).cloned();

        let future = handler.and_then(|handler| handler(entry.message, entry.connection));
        let Some(future) = future else {
            self.metrics.frames_unhandled.inc();
            let e = HandlerError::NoHandler(type_name.to_string());
            tracing::warn!(message = type_name, %connection, code = e.code(), "no handler");
            return;
        };

        self.metrics.frames_dispatched.inc();
        let started = Instant::now();
        let result = future.await;
        self.metrics
            .handler_time_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);

        if let Err(e) = result {
            self.metrics.handler_rejections.inc();
            tracing::warn!(
                message = type_name,
                %connection,
                priority = %entry.priority,
                code = e.code(),
                error = %e,
                "handler rejected message"
            );
        }
    }
}

impl FrameSink for Dispatcher {
    fn deliver(&self, priority: Priority, message: TypedMessage, connection: Arc<Connection>) {
        self.submit(priority, message, connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use peerlink_types::{ConnectionId, TransportKind};
    use serde::{Deserialize, Serialize};
    use tokio::sync::mpsc;

    #[derive(Debug, Serialize, Deserialize)]
    struct Job(u8);

    impl WireType for Job {
        const TYPE_NAME: &'static str = "Job";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Orphan;

    impl WireType for Orphan {
        const TYPE_NAME: &'static str = "Orphan";
    }

    fn connection() -> Arc<Connection> {
        Arc::new(Connection::detached(
            ConnectionId::from_bytes([7; 20]),
            TransportKind::Accepted,
            None,
        ))
    }

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(Arc::new(NodeMetrics::new())))
    }

    #[test]
    fn highest_priority_pops_first() {
        let d = dispatcher();
        for (n, p) in [(1, Priority::LOW_0), (2, Priority::HIGH_2), (3, Priority::MIDDLE_1)] {
            d.submit(p, TypedMessage::new(Job(n)), connection());
        }
        let order: Vec<u8> = std::iter::from_fn(|| d.pop())
            .map(|e| e.message.downcast::<Job>().unwrap().0)
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn each_entry_is_popped_once() {
        let d = dispatcher();
        for n in 0..20 {
            d.submit(Priority::MIDDLE_0, TypedMessage::new(Job(n)), connection());
        }
        let mut seen: Vec<u8> = std::iter::from_fn(|| d.pop())
            .map(|e| e.message.downcast::<Job>().unwrap().0)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert!(d.is_empty());
    }

    #[test]
    fn second_handler_for_a_type_rejected() {
        let d = dispatcher();
        d.register_handler::<Job, _, _>(|_, _| async { Ok(()) }).unwrap();
        let again = d.register_handler::<Job, _, _>(|_, _| async { Ok(()) });
        assert!(matches!(again, Err(HandlerError::AlreadyRegistered("Job"))));
    }

    #[tokio::test]
    async fn workers_run_handlers() {
        let d = dispatcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        d.register_handler::<Job, _, _>(move |job, conn| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((job.0, *conn.id()));
                Ok(())
            }
        })
        .unwrap();
        let handles = d.start(2);

        d.submit(Priority::HIGH_0, TypedMessage::new(Job(42)), connection());
        let (n, id) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 42);
        assert_eq!(id, ConnectionId::from_bytes([7; 20]));

        d.shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn missing_handler_is_counted_not_fatal() {
        let metrics = Arc::new(NodeMetrics::new());
        let d = Dispatcher::new(Arc::clone(&metrics));
        d.dispatch(QueueEntry {
            priority: Priority::LOW_0,
            message: TypedMessage::new(Orphan),
            connection: connection(),
        })
        .await;
        assert_eq!(metrics.frames_unhandled.get(), 1);
        assert_eq!(metrics.frames_dispatched.get(), 0);
    }

    #[tokio::test]
    async fn handler_error_is_counted() {
        let metrics = Arc::new(NodeMetrics::new());
        let d = Dispatcher::new(Arc::clone(&metrics));
        d.register_handler::<Job, _, _>(|_, _| async { Err(HandlerError::SelfRegistration) })
            .unwrap();
        d.dispatch(QueueEntry {
            priority: Priority::LOW_0,
            message: TypedMessage::new(Job(1)),
            connection: connection(),
        })
        .await;
        assert_eq!(metrics.handler_rejections.get(), 1);
    }

    #[tokio::test]
    async fn shutdown_discards_queue() {
        let d = dispatcher();
        let handles = d.start(1);
        d.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
        d.submit(Priority::LOW_0, TypedMessage::new(Job(1)), connection());
        d.shutdown();
        assert!(d.is_empty());
        assert!(!d.is_running());
    }
}
