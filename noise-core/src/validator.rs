//! Peer ID / channel name / message-size validation, and the Curve25519
//! low-order-point blacklist that protects every public key this crate accepts.

use crate::error::{Error, Result};

/// Maximum accepted ciphertext/plaintext message size.
pub const MAX_MESSAGE_SIZE: usize = 65_535;
/// Maximum accepted handshake message size.
pub const MAX_HANDSHAKE_MESSAGE_SIZE: usize = 2_048;

const PEER_ID_MIN: usize = 1;
const PEER_ID_MAX: usize = 64;
const CHANNEL_NAME_MIN: usize = 2;
const CHANNEL_NAME_MAX: usize = 32;

/// The canonical Curve25519 low-order points. A shared secret derived against any
/// of these is predictable or degenerate and must never be accepted as a remote
/// ephemeral or static key.
pub const LOW_ORDER_POINTS: [[u8; 32]; 8] = [
    [0u8; 32],
    {
        let mut p = [0u8; 32];
        p[0] = 0x01;
        p
    },
    [
        0xe0, 0xeb, 0x7a, 0x7c, 0x3b, 0x41, 0xb8, 0xae, 0x16, 0x56, 0xe3, 0xfa, 0xf1, 0x9f, 0xc4,
        0x6a, 0xda, 0x09, 0x8d, 0xeb, 0x9c, 0x32, 0xb1, 0xfd, 0x86, 0x62, 0x05, 0x16, 0x5f, 0x49,
        0xb8, 0x00,
    ],
    [
        0x5f, 0x9c, 0x95, 0xbc, 0xa3, 0x50, 0x8c, 0x24, 0xb1, 0xd0, 0xb1, 0x55, 0x9c, 0x83, 0xef,
        0x5b, 0x04, 0x44, 0x5c, 0xc4, 0x58, 0x1c, 0x8e, 0x86, 0xd8, 0x22, 0x4e, 0xdd, 0xd0, 0x9f,
        0x11, 0x57,
    ],
    [0xffu8; 32],
    {
        let mut p = [0xffu8; 32];
        p[31] = 0x7f;
        p
    },
    [
        0xda, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff,
    ],
    [
        0xdb, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff,
    ],
];

/// Validates a 32-byte Curve25519 public key: rejects wrong length, all-zero, and
/// the canonical low-order blacklist. Does not perform clamping or decoding beyond
/// the length/content checks named in the spec; callers still run the DH itself.
pub fn validate_public_key(bytes: &[u8]) -> Result<[u8; 32]> {
    let key: [u8; 32] = bytes.try_into().map_err(|_| Error::InvalidPublicKey)?;
    if LOW_ORDER_POINTS.iter().any(|p| p == &key) {
        tracing::warn!("SECURITY: rejected low-order Curve25519 public key");
        return Err(Error::InvalidPublicKey);
    }
    Ok(key)
}

/// `[A-Za-z0-9_-]`, 1-64 characters.
pub fn validate_peer_id(id: &str) -> Result<()> {
    if !(PEER_ID_MIN..=PEER_ID_MAX).contains(&id.len()) {
        return Err(Error::InvalidPeerId);
    }
    if !id.bytes().all(is_id_byte) {
        return Err(Error::InvalidPeerId);
    }
    Ok(())
}

/// Starts with `#`, 2-32 characters total, body `[A-Za-z0-9_-]`.
pub fn validate_channel_name(name: &str) -> Result<()> {
    if !(CHANNEL_NAME_MIN..=CHANNEL_NAME_MAX).contains(&name.len()) {
        return Err(Error::InvalidChannelName);
    }
    let mut chars = name.bytes();
    if chars.next() != Some(b'#') {
        return Err(Error::InvalidChannelName);
    }
    if !chars.all(is_id_byte) {
        return Err(Error::InvalidChannelName);
    }
    Ok(())
}

fn is_id_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Rejects plaintext/ciphertext over the message size cap.
pub fn validate_message_size(len: usize) -> Result<()> {
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::MessageTooLarge);
    }
    Ok(())
}

/// Rejects handshake messages over the handshake size cap.
pub fn validate_handshake_message_size(len: usize) -> Result<()> {
    if len > MAX_HANDSHAKE_MESSAGE_SIZE {
        return Err(Error::MessageTooLarge);
    }
    Ok(())
}
