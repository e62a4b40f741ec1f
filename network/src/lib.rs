//! Transport layer for peerlink.
//!
//! A [`ConnectionRegistry`] owns every live [`Connection`] and every bound
//! [`Listener`]. Each connection runs one reader and one writer task; the
//! reader decodes frames and hands them to a [`FrameSink`], everything else
//! talks to the socket only through [`Connection::write`] and
//! [`ConnectionRegistry::disconnect`].

pub mod connection;
pub mod error;
pub mod listener;
pub mod registry;
pub mod sink;

pub use connection::{Connection, ConnectionHandle};
pub use error::NetworkError;
pub use listener::{ListenAddr, Listener};
pub use registry::{ConnectTarget, ConnectionRegistry, RegistryConfig};
pub use sink::FrameSink;
