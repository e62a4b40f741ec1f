//! Connection identity and transport medium.

use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Random 160-bit connection identifier, shown as 40 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId([u8; 20]);

impl ConnectionId {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({self})")
    }
}

impl FromStr for ConnectionId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| TypesError::InvalidConnectionId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

/// The medium a connection runs over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Outbound TCP over IPv4.
    Tcp4,
    /// Outbound TCP over IPv6.
    Tcp6,
    /// Outbound local domain socket.
    Unix,
    /// Inbound, produced by a listener.
    Accepted,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp4 => "tcp4",
            TransportKind::Tcp6 => "tcp6",
            TransportKind::Unix => "unix",
            TransportKind::Accepted => "accepted",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
