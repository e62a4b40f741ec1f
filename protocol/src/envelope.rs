use peerlink_types::EncryptMode;
use serde::{Deserialize, Serialize};

/// Format version written into every envelope.
pub const ENVELOPE_VERSION: &str = "1";

/// The unit exchanged between peers, before framing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub type_name: String,
    /// Set only when `data` holds the zlib-compressed payload.
    pub compress: bool,
    pub encrypt: EncryptMode,
    pub data: Vec<u8>,
}
