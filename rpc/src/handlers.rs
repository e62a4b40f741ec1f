//! RPC request handlers.

use std::fmt::Write;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use peerlink_node::{Node, PeerNode};

use crate::error::RpcError;

// ── Nodes ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NodeSummary {
    pub address: String,
    pub pub_key: String,
    pub version: String,
    pub local_ip: String,
    pub listen_port: u16,
    pub public_ip: String,
    pub public_port: u16,
    pub is_public_node: bool,
    pub public_address: Option<String>,
    pub height: u64,
    pub sign_fee: u64,
    pub package_fee: u64,
    pub connected: bool,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            address: node.address.to_string(),
            pub_key: node.pub_key.to_hex(),
            version: node.version.clone(),
            local_ip: node.local_ip.to_string(),
            listen_port: node.listen_port,
            public_ip: node.public_ip.to_string(),
            public_port: node.public_port,
            is_public_node: node.is_public_node,
            public_address: node.public_address.as_ref().map(ToString::to_string),
            height: node.height,
            sign_fee: node.sign_fee,
            package_fee: node.package_fee,
            connected: node.is_connected(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NodesResponse {
    pub count: usize,
    pub nodes: Vec<NodeSummary>,
}

/// `GET /nodes`: every known node as JSON, the local node first.
pub async fn nodes(State(node): State<Arc<PeerNode>>) -> Json<NodesResponse> {
    let nodes: Vec<NodeSummary> = node.list_nodes().iter().map(NodeSummary::from).collect();
    Json(NodesResponse {
        count: nodes.len(),
        nodes,
    })
}

// ── Info ─────────────────────────────────────────────────────────────────

/// `GET /info`: a plain-text page with every field of every known node.
pub async fn info(State(node): State<Arc<PeerNode>>) -> Result<impl IntoResponse, RpcError> {
    let body = render_info(&node.list_nodes())?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

fn render_info(nodes: &[Node]) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "nodes: {}", nodes.len())?;
    for (i, node) in nodes.iter().enumerate() {
        let label = if i == 0 { "self" } else { "peer" };
        write_node(&mut out, &NodeSummary::from(node), label)?;
    }
    Ok(out)
}

fn write_node(out: &mut String, node: &NodeSummary, label: &str) -> std::fmt::Result {
    writeln!(out, "[{label}] {}", node.address)?;
    writeln!(out, "  pub_key:        {}", node.pub_key)?;
    writeln!(out, "  version:        {}", node.version)?;
    writeln!(out, "  local:          {}:{}", node.local_ip, node.listen_port)?;
    writeln!(out, "  public:         {}:{}", node.public_ip, node.public_port)?;
    writeln!(out, "  is_public_node: {}", node.is_public_node)?;
    writeln!(
        out,
        "  gateway:        {}",
        node.public_address.as_deref().unwrap_or("-")
    )?;
    writeln!(out, "  height:         {}", node.height)?;
    writeln!(out, "  sign_fee:       {}", node.sign_fee)?;
    writeln!(out, "  package_fee:    {}", node.package_fee)?;
    writeln!(out, "  connected:      {}", node.connected)
}

// ── Metrics ──────────────────────────────────────────────────────────────

/// `GET /metrics`: Prometheus text exposition of the node's registry.
pub async fn metrics(State(node): State<Arc<PeerNode>>) -> Result<impl IntoResponse, RpcError> {
    let body = node
        .metrics()
        .encode_text()
        .map_err(|e| RpcError::Metrics(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
