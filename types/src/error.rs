use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid node address: {0}")]
    InvalidAddress(String),

    #[error("invalid connection id: {0}")]
    InvalidConnectionId(String),

    #[error("unknown encrypt mode: {0}")]
    UnknownEncryptMode(u8),
}
