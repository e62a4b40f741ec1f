use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("key file {0} does not hold a 32-byte hex seed")]
    InvalidKeyFile(String),
}
