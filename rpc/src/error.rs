//! RPC error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("cannot bind diagnostic endpoint on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("metrics encoding failed: {0}")]
    Metrics(String),

    #[error("rendering failed: {0}")]
    Render(#[from] std::fmt::Error),
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "diagnostic request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
