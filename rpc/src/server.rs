//! Axum-based diagnostic server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;

use peerlink_node::PeerNode;

use crate::error::RpcError;
use crate::handlers;

pub struct DiagnosticServer;

impl DiagnosticServer {
    /// The endpoint's routes, bound to `node`.
    pub fn router(node: Arc<PeerNode>) -> Router {
        Router::new()
            .route("/info", get(handlers::info))
            .route("/nodes", get(handlers::nodes))
            .route("/metrics", get(handlers::metrics))
            .with_state(node)
    }

    /// Serve on `port` until `shutdown` fires.
    pub async fn serve(
        port: u16,
        node: Arc<PeerNode>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), RpcError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| RpcError::Bind { port, source })?;
        tracing::info!(%addr, "diagnostic endpoint listening");
        axum::serve(listener, Self::router(node))
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;
        tracing::info!("diagnostic endpoint stopped");
        Ok(())
    }
}
