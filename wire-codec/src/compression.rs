//! Length-prefixed DEFLATE compression for outer-packet payloads. The codec
//! only ever uses compression when it demonstrably shrinks the payload; the
//! exact original size travels alongside so decompression is bounded.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// Below this many bytes, compression overhead (DEFLATE's own framing) tends
/// to outweigh any savings, so it is never attempted.
const MIN_COMPRESSIBLE_SIZE: usize = 100;

/// True when `data` is large enough, and actually compresses small enough,
/// to be worth the round-trip cost of decompressing it later.
pub fn should_compress(data: &[u8]) -> bool {
    if data.len() < MIN_COMPRESSIBLE_SIZE {
        return false;
    }
    match compress(data) {
        Ok(compressed) => compressed.len() < data.len(),
        Err(_) => false,
    }
}

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::CompressionFailed(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::CompressionFailed(e.to_string()))
}

/// Decompresses `data`, expecting exactly `original_size` bytes of output.
pub fn decompress(data: &[u8], original_size: usize) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = vec![0u8; original_size];
    decoder
        .read_exact(&mut out)
        .map_err(|e| Error::DecompressionFailed(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highly_repetitive_payload_compresses() {
        let data = vec![0x41u8; 512];
        assert!(should_compress(&data));
        let compressed = compress(&data).expect("compresses");
        assert!(compressed.len() < data.len());
        let restored = decompress(&compressed, data.len()).expect("decompresses");
        assert_eq!(restored, data);
    }

    #[test]
    fn short_payload_is_never_compressed() {
        let data = vec![0x41u8; 10];
        assert!(!should_compress(&data));
    }

    #[test]
    fn high_entropy_payload_is_not_compressed() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 2654435761u32) as u8).collect();
        // Not a strict guarantee for every possible input, but this particular
        // pseudo-random sequence does not compress smaller under DEFLATE.
        let compressed = compress(&data).expect("compresses");
        if compressed.len() >= data.len() {
            assert!(!should_compress(&data));
        }
    }
}
