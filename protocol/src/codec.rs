//! Frame codec.
//!
//! Decoding never fails the connection: a rejected frame reports how many
//! bytes to skip so the reader can carry on with whatever follows it.

use std::borrow::Cow;

use peerlink_types::{EncryptMode, Priority};

use crate::compress::{compress_if_smaller, decompress};
use crate::envelope::{Envelope, ENVELOPE_VERSION};
use crate::registry::{MessageRegistry, TypedMessage, WireType};
use crate::{FrameError, ProtocolError};

/// Largest value accepted in the length prefix.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Literal written as the last field of every frame.
pub const FRAME_SENTINEL: u32 = 7_777_777;

const LEN_PREFIX: usize = 4;
/// Checksum, priority flags and sentinel.
const TRAILER_LEN: usize = 12;

/// Build a frame around an already-serialized payload.
///
/// With `compress` set the payload is zlib-compressed, but the compressed
/// form is kept only if it is strictly smaller; otherwise the envelope goes
/// out uncompressed with its compress flag cleared.
pub fn encode_frame(
    payload: &[u8],
    type_name: &str,
    priority: Priority,
    compress: bool,
    encrypt: EncryptMode,
) -> Result<Vec<u8>, ProtocolError> {
    let compressed = if compress {
        compress_if_smaller(payload)?
    } else {
        None
    };
    let envelope = Envelope {
        version: ENVELOPE_VERSION.to_string(),
        type_name: type_name.to_string(),
        compress: compressed.is_some(),
        encrypt,
        data: compressed.unwrap_or_else(|| payload.to_vec()),
    };
    let body = bincode::serialize(&envelope)?;

    let length = body.len() + TRAILER_LEN;
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(LEN_PREFIX + length);
    frame.extend_from_slice(&(length as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&adler2::adler32_slice(&body).to_le_bytes());
    frame.extend_from_slice(&priority.to_flags().to_le_bytes());
    frame.extend_from_slice(&FRAME_SENTINEL.to_le_bytes());
    Ok(frame)
}

/// Serialize `message` and frame it under its registered type name.
pub fn encode_message<T: WireType>(
    message: &T,
    priority: Priority,
    compress: bool,
    encrypt: EncryptMode,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = bincode::serialize(message)?;
    encode_frame(&payload, T::TYPE_NAME, priority, compress, encrypt)
}

/// A checksummed frame whose envelope parsed, payload still opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub consumed: usize,
    pub priority: Priority,
    pub envelope: Envelope,
}

impl RawFrame {
    /// The payload with compression undone.
    pub fn payload(&self) -> Result<Cow<'_, [u8]>, FrameError> {
        if !self.envelope.compress {
            return Ok(Cow::Borrowed(&self.envelope.data));
        }
        decompress(&self.envelope.data, MAX_FRAME_SIZE)
            .map(Cow::Owned)
            .map_err(|e| FrameError::Decompress {
                frame_len: self.consumed,
                reason: e.to_string(),
            })
    }
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

/// Split one frame off the front of `buf`.
///
/// `Ok(None)` means more bytes are needed.
pub fn read_frame(buf: &[u8]) -> Result<Option<RawFrame>, FrameError> {
    if buf.len() < LEN_PREFIX {
        return Ok(None);
    }
    let length = le_u32(buf, 0);
    let len = length as usize;
    if !(TRAILER_LEN..=MAX_FRAME_SIZE).contains(&len) {
        return Err(FrameError::BadLength(length));
    }
    let frame_len = LEN_PREFIX + len;
    if buf.len() < frame_len {
        return Ok(None);
    }

    let body = &buf[LEN_PREFIX..frame_len - TRAILER_LEN];
    let trailer = &buf[frame_len - TRAILER_LEN..frame_len];
    let expected = le_u32(trailer, 0);
    let flags = le_u32(trailer, 4);
    let sentinel = le_u32(trailer, 8);

    let computed = adler2::adler32_slice(body);
    if computed != expected {
        return Err(FrameError::ChecksumMismatch {
            frame_len,
            expected,
            computed,
        });
    }
    if sentinel != FRAME_SENTINEL {
        return Err(FrameError::BadSentinel {
            frame_len,
            found: sentinel,
        });
    }

    let envelope: Envelope = bincode::deserialize(body).map_err(|e| FrameError::Envelope {
        frame_len,
        reason: e.to_string(),
    })?;
    Ok(Some(RawFrame {
        consumed: frame_len,
        priority: Priority::from_flags(flags),
        envelope,
    }))
}

#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub consumed: usize,
    pub priority: Priority,
    pub message: TypedMessage,
}

#[derive(Debug, Clone)]
pub enum Decoded {
    /// Not enough bytes for a whole frame yet.
    Incomplete,
    Frame(DecodedFrame),
}

/// Decode one frame into a typed message.
///
/// Checks run in order: length, checksum, sentinel, envelope, type lookup,
/// decompression, payload.
pub fn decode_frame(buf: &[u8], registry: &MessageRegistry) -> Result<Decoded, FrameError> {
    let Some(frame) = read_frame(buf)? else {
        return Ok(Decoded::Incomplete);
    };
    let frame_len = frame.consumed;
    let type_name = frame.envelope.type_name.as_str();
    let unknown = || FrameError::UnknownType {
        frame_len,
        type_name: type_name.to_string(),
    };
    if !registry.contains(type_name) {
        return Err(unknown());
    }

    let payload = frame.payload()?;
    match registry.decode(type_name, &payload) {
        None => Err(unknown()),
        Some(Err(e)) => Err(FrameError::Payload {
            frame_len,
            type_name: type_name.to_string(),
            reason: e.to_string(),
        }),
        Some(Ok(message)) => Ok(Decoded::Frame(DecodedFrame {
            consumed: frame_len,
            priority: frame.priority,
            message,
        })),
    }
}

/// Everything [`drain_frames`] pulled out of a buffer.
#[derive(Debug, Default)]
pub struct Drained {
    pub frames: Vec<DecodedFrame>,
    pub rejected: Vec<FrameError>,
}

/// Decode every complete frame at the front of `buf` and remove the bytes
/// they occupied. A rejected frame is skipped by its declared length; a
/// rejected length prefix clears the buffer.
pub fn drain_frames(buf: &mut Vec<u8>, registry: &MessageRegistry) -> Drained {
    let mut drained = Drained::default();
    let mut offset = 0;
    while offset < buf.len() {
        match decode_frame(&buf[offset..], registry) {
            Ok(Decoded::Incomplete) => break,
            Ok(Decoded::Frame(frame)) => {
                offset += frame.consumed;
                drained.frames.push(frame);
            }
            Err(e) => {
                offset = match e.skip_len() {
                    Some(skip) => offset + skip,
                    None => buf.len(),
                };
                drained.rejected.push(e);
            }
        }
    }
    buf.drain(..offset);
    drained
}
