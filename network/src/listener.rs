//! Bound listening sockets.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

use peerlink_types::TransportKind;

use crate::{ConnectionRegistry, NetworkError};

/// Longest path that fits `sockaddr_un.sun_path` with its terminating NUL.
const MAX_UNIX_PATH: usize = 107;

/// Pause after a failed accept so a persistent error cannot spin the task.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Tcp(addr) => write!(f, "tcp://{addr}"),
            ListenAddr::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    /// Bind exactly one medium. A leftover socket file at a unix path is
    /// removed before binding.
    pub async fn bind(addr: &ListenAddr) -> Result<Self, NetworkError> {
        let bind_error = |source| NetworkError::Bind {
            addr: addr.to_string(),
            source,
        };
        match addr {
            ListenAddr::Tcp(socket_addr) => TcpListener::bind(socket_addr)
                .await
                .map(Listener::Tcp)
                .map_err(bind_error),
            #[cfg(unix)]
            ListenAddr::Unix(path) => {
                let len = path.as_os_str().len();
                if len == 0 || len > MAX_UNIX_PATH {
                    return Err(NetworkError::InvalidUnixPath(path.clone()));
                }
                match std::fs::remove_file(path) {
                    Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(bind_error(e)),
                }
                UnixListener::bind(path).map(Listener::Unix).map_err(bind_error)
            }
            #[cfg(not(unix))]
            ListenAddr::Unix(_) => Err(NetworkError::Unsupported("unix domain sockets")),
        }
    }

    /// The address actually bound, which differs from the request for port 0.
    pub fn local_addr(&self) -> Result<ListenAddr, NetworkError> {
        match self {
            Listener::Tcp(listener) => listener
                .local_addr()
                .map(ListenAddr::Tcp)
                .map_err(|source| NetworkError::Bind {
                    addr: "tcp listener".into(),
                    source,
                }),
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let addr = listener.local_addr().map_err(|source| NetworkError::Bind {
                    addr: "unix listener".into(),
                    source,
                })?;
                addr.as_pathname()
                    .map(|p| ListenAddr::Unix(p.to_path_buf()))
                    .ok_or_else(|| NetworkError::InvalidUnixPath(PathBuf::new()))
            }
        }
    }

    /// Accept forever, registering each stream as an accepted connection.
    pub(crate) async fn accept_loop(self, registry: ConnectionRegistry) {
        loop {
            let accepted = match &self {
                Listener::Tcp(listener) => listener.accept().await.map(|(stream, peer)| {
                    let _ = stream.set_nodelay(true);
                    let (reader, writer) = stream.into_split();
                    registry.adopt(TransportKind::Accepted, Some(peer), reader, writer)
                }),
                #[cfg(unix)]
                Listener::Unix(listener) => listener.accept().await.map(|(stream, _)| {
                    let (reader, writer) = stream.into_split();
                    registry.adopt(TransportKind::Accepted, None, reader, writer)
                }),
            };
            match accepted {
                Ok(Ok(conn)) => {
                    tracing::debug!(
                        connection = %conn.id(),
                        peer = ?conn.peer_addr(),
                        "accepted connection"
                    );
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "could not register accepted connection"),
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_port_zero_reports_real_port() {
        let listener = Listener::bind(&ListenAddr::Tcp("127.0.0.1:0".parse().unwrap()))
            .await
            .unwrap();
        match listener.local_addr().unwrap() {
            ListenAddr::Tcp(addr) => assert_ne!(addr.port(), 0),
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test]
    async fn second_tcp_bind_on_same_port_fails() {
        let first = Listener::bind(&ListenAddr::Tcp("127.0.0.1:0".parse().unwrap()))
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();
        assert!(matches!(
            Listener::bind(&taken).await,
            Err(NetworkError::Bind { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_bind_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.sock");
        std::fs::write(&path, b"stale").unwrap();
        let listener = Listener::bind(&ListenAddr::Unix(path.clone())).await.unwrap();
        assert_eq!(listener.local_addr().unwrap(), ListenAddr::Unix(path));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_unix_path_rejected() {
        assert!(matches!(
            Listener::bind(&ListenAddr::Unix(PathBuf::new())).await,
            Err(NetworkError::InvalidUnixPath(_))
        ));
    }
}
