//! Size-gated zlib compression for envelope payloads.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Compress `data`, returning `None` unless the result is strictly smaller.
pub fn compress_if_smaller(data: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    Ok((compressed.len() < data.len()).then_some(compressed))
}

/// Inflate `data`, refusing output larger than `limit` bytes.
pub fn decompress(data: &[u8], limit: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("inflated payload exceeds {limit} bytes"),
        ));
    }
    Ok(out)
}
