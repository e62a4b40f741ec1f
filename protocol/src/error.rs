use thiserror::Error;

/// Failures while building an outbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

impl From<bincode::Error> for ProtocolError {
    fn from(e: bincode::Error) -> Self {
        ProtocolError::Serialization(e.to_string())
    }
}

/// Why an inbound frame was rejected.
///
/// Every variant except [`FrameError::BadLength`] carries the full size of the
/// offending frame so the reader can step over it and keep the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("unusable frame length {0}")]
    BadLength(u32),

    #[error("checksum mismatch: frame carries {expected:#010x}, envelope hashes to {computed:#010x}")]
    ChecksumMismatch {
        frame_len: usize,
        expected: u32,
        computed: u32,
    },

    #[error("bad frame sentinel {found}")]
    BadSentinel { frame_len: usize, found: u32 },

    #[error("malformed envelope: {reason}")]
    Envelope { frame_len: usize, reason: String },

    #[error("unknown message type {type_name:?}")]
    UnknownType { frame_len: usize, type_name: String },

    #[error("payload decompression failed: {reason}")]
    Decompress { frame_len: usize, reason: String },

    #[error("malformed {type_name} payload: {reason}")]
    Payload {
        frame_len: usize,
        type_name: String,
        reason: String,
    },
}

impl FrameError {
    /// Bytes to discard to get past the bad frame, or `None` when the length
    /// prefix itself cannot be trusted and the whole buffer must go.
    pub fn skip_len(&self) -> Option<usize> {
        match self {
            FrameError::BadLength(_) => None,
            FrameError::ChecksumMismatch { frame_len, .. }
            | FrameError::BadSentinel { frame_len, .. }
            | FrameError::Envelope { frame_len, .. }
            | FrameError::UnknownType { frame_len, .. }
            | FrameError::Decompress { frame_len, .. }
            | FrameError::Payload { frame_len, .. } => Some(*frame_len),
        }
    }

    /// Negative reject code, as logged.
    pub fn code(&self) -> i32 {
        match self {
            FrameError::BadLength(_) => -1,
            FrameError::ChecksumMismatch { .. } => -2,
            FrameError::BadSentinel { .. } => -3,
            FrameError::Envelope { .. } => -4,
            FrameError::UnknownType { .. } => -5,
            FrameError::Decompress { .. } => -6,
            FrameError::Payload { .. } => -7,
        }
    }
}
