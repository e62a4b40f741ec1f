use std::path::PathBuf;

use peerlink_types::ConnectionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("already listening on {0}")]
    AlreadyListening(String),

    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid unix socket path {0:?}")]
    InvalidUnixPath(PathBuf),

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("connection id {0} already registered")]
    DuplicateId(ConnectionId),

    #[error("connection {0} is not connected")]
    NotConnected(ConnectionId),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}
