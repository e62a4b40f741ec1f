use peerlink_network::NetworkError;
use peerlink_protocol::{FrameError, ProtocolError};
use peerlink_types::NodeAddress;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] peerlink_store::StoreError),

    #[error("identity error: {0}")]
    Crypto(#[from] peerlink_crypto::CryptoError),

    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node already started")]
    AlreadyStarted,

    #[error("shutdown timeout")]
    ShutdownTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("node {0} is already known")]
    Duplicate(NodeAddress),

    #[error("node {0} is not known")]
    NotFound(NodeAddress),

    #[error("the local node cannot be stored as a peer")]
    SelfEntry,
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("cannot route a message to the local node")]
    SelfDestination,

    #[error("no route to unknown node {0}")]
    UnknownDestination(NodeAddress),

    #[error("gateway {gateway} of {dest} is itself a sub-node")]
    ChainedGateway { dest: NodeAddress, gateway: NodeAddress },

    #[error("sub-node {0} has no gateway")]
    NoGateway(NodeAddress),

    #[error("next hop {0} has no live connection")]
    NextHopUnavailable(NodeAddress),

    #[error("encode relay frame: {0}")]
    Encode(#[from] ProtocolError),

    #[error("write failed: {0}")]
    Write(#[from] NetworkError),
}

/// Why a handler refused a message. Never sent back to the peer.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("no handler for {0}")]
    NoHandler(String),

    #[error("a handler for {0} is already registered")]
    AlreadyRegistered(&'static str),

    #[error("message claims to come from the local node")]
    SelfRegistration,

    #[error("address {0} does not match its public key")]
    AddressMismatch(NodeAddress),

    #[error("bad signature from {0}")]
    BadSignature(NodeAddress),

    #[error("node {0} is already connected")]
    Duplicate(NodeAddress),

    #[error("relayed frame is incomplete")]
    IncompleteFrame,

    #[error("sync report for {0} did not arrive on that gateway's connection")]
    UnverifiedReporter(NodeAddress),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("relayed frame rejected: {0}")]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl HandlerError {
    /// Negative result code, written to logs alongside the message type.
    pub fn code(&self) -> i32 {
        match self {
            HandlerError::NoHandler(_) => -1,
            HandlerError::AlreadyRegistered(_) => -2,
            HandlerError::SelfRegistration => -3,
            HandlerError::AddressMismatch(_) => -4,
            HandlerError::BadSignature(_) => -5,
            HandlerError::Duplicate(_) => -6,
            HandlerError::IncompleteFrame => -7,
            HandlerError::Directory(DirectoryError::Duplicate(_)) => -6,
            HandlerError::Directory(DirectoryError::NotFound(_)) => -8,
            HandlerError::Directory(DirectoryError::SelfEntry) => -3,
            HandlerError::Routing(RoutingError::UnknownDestination(_)) => -9,
            HandlerError::Routing(_) => -10,
            HandlerError::Frame(_) => -11,
            HandlerError::Protocol(_) => -12,
            HandlerError::Network(_) => -13,
            HandlerError::UnverifiedReporter(_) => -14,
        }
    }
}
