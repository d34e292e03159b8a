//! Crate-wide error taxonomy for the packet and message codecs.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Decode failures are never partial: every one of these maps to "return no
/// packet/message" at the caller, never a partially-populated value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("buffer too short: need at least {needed} bytes, have {have}")]
    TooShort { needed: usize, have: usize },
    #[error("total packet size {0} exceeds the 128 KiB cap")]
    TotalSizeExceeded(usize),
    #[error("payload length {0} exceeds the 32768-byte cap")]
    PayloadTooLarge(usize),
    #[error("unsupported packet version {0}")]
    UnsupportedVersion(u8),
    #[error("field length {field} of {len} exceeds remaining buffer")]
    FieldOutOfBounds { field: &'static str, len: usize },
    #[error("invalid UTF-8 in field {0}")]
    InvalidUtf8(&'static str),
    #[error("compression failed: {0}")]
    CompressionFailed(String),
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
}
