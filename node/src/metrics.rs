//! Prometheus metrics for the peerlink node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`] that the diagnostic
//! `/metrics` endpoint encodes into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Messages handed to a handler by the dispatch workers.
    pub frames_dispatched: IntCounter,
    /// Messages dropped because no handler was registered for their type.
    pub frames_unhandled: IntCounter,
    /// Handler invocations that returned an error.
    pub handler_rejections: IntCounter,
    /// TransMsg envelopes sent toward a next hop.
    pub messages_relayed: IntCounter,
    /// Broadcast frames written to peers, counted per recipient.
    pub broadcasts_sent: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub connections: IntGauge,
    /// Peers in the directory, excluding the local node.
    pub known_nodes: IntGauge,
    pub public_nodes: IntGauge,
    pub dispatch_queue_depth: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time spent inside a message handler, in milliseconds.
    pub handler_time_ms: Histogram,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let frames_dispatched = register_int_counter_with_registry!(
            Opts::new(
                "peerlink_frames_dispatched_total",
                "Messages delivered to a handler"
            ),
            registry
        )
        .expect("failed to register frames_dispatched counter");

        let frames_unhandled = register_int_counter_with_registry!(
            Opts::new(
                "peerlink_frames_unhandled_total",
                "Messages dropped for lack of a handler"
            ),
            registry
        )
        .expect("failed to register frames_unhandled counter");

        let handler_rejections = register_int_counter_with_registry!(
            Opts::new(
                "peerlink_handler_rejections_total",
                "Handler invocations that returned an error"
            ),
            registry
        )
        .expect("failed to register handler_rejections counter");

        let messages_relayed = register_int_counter_with_registry!(
            Opts::new(
                "peerlink_messages_relayed_total",
                "TransMsg envelopes sent to a next hop"
            ),
            registry
        )
        .expect("failed to register messages_relayed counter");

        let broadcasts_sent = register_int_counter_with_registry!(
            Opts::new(
                "peerlink_broadcasts_sent_total",
                "Broadcast frames written, per recipient"
            ),
            registry
        )
        .expect("failed to register broadcasts_sent counter");

        let connections = register_int_gauge_with_registry!(
            Opts::new("peerlink_connections", "Connections in the registry"),
            registry
        )
        .expect("failed to register connections gauge");

        let known_nodes = register_int_gauge_with_registry!(
            Opts::new("peerlink_known_nodes", "Peers in the directory"),
            registry
        )
        .expect("failed to register known_nodes gauge");

        let public_nodes = register_int_gauge_with_registry!(
            Opts::new("peerlink_public_nodes", "Public peers in the directory"),
            registry
        )
        .expect("failed to register public_nodes gauge");

        let dispatch_queue_depth = register_int_gauge_with_registry!(
            Opts::new(
                "peerlink_dispatch_queue_depth",
                "Messages waiting for a dispatch worker"
            ),
            registry
        )
        .expect("failed to register dispatch_queue_depth gauge");

        // 0.05 ms → ~800 ms.
        let handler_time_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "peerlink_handler_time_ms",
                "Handler execution time in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(0.05, 2.0, 15).unwrap_or_default()),
            registry
        )
        .expect("failed to register handler_time_ms histogram");

        Self {
            registry,
            frames_dispatched,
            frames_unhandled,
            handler_rejections,
            messages_relayed,
            broadcasts_sent,
            connections,
            known_nodes,
            public_nodes,
            dispatch_queue_depth,
            handler_time_ms,
        }
    }

    /// Encode every metric in the text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
