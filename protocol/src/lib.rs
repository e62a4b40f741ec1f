//! Wire protocol: message framing, envelope encoding, type registry, versioning.
//!
//! A frame on the wire is, with every integer little-endian:
//!
//! ```text
//! [4B length][envelope][4B adler-32 of envelope][4B priority flags][4B sentinel]
//! length = envelope.len() + 12
//! ```

pub mod codec;
pub mod compress;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod version;

pub use codec::{
    decode_frame, drain_frames, encode_frame, encode_message, read_frame, Decoded, DecodedFrame,
    Drained, RawFrame, FRAME_SENTINEL, MAX_FRAME_SIZE,
};
pub use envelope::{Envelope, ENVELOPE_VERSION};
pub use error::{FrameError, ProtocolError};
pub use registry::{MessageRegistry, TypedMessage, WireType};
pub use version::{node_version, NetKind};
