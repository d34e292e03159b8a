//! `BitchatPacket`: the outer wire record every transport carries verbatim,
//! header, optional recipient, length-prefixed-compressed payload, padding to
//! a fixed block size, and an optional signature.

use bytes::{Buf, BufMut, BytesMut};

use crate::compression::{compress, decompress, should_compress};
use crate::error::{Error, Result};
use crate::padding::{pad, unpad};

const FLAG_HAS_RECIPIENT: u8 = 0x01;
const FLAG_HAS_SIGNATURE: u8 = 0x02;
const FLAG_IS_COMPRESSED: u8 = 0x04;

const HEADER_LEN: usize = 1 + 1 + 1 + 8 + 1 + 2; // version,type,ttl,timestamp,flags,payloadLen
const SENDER_ID_LEN: usize = 8;
const RECIPIENT_ID_LEN: usize = 8;
const SIGNATURE_LEN: usize = 64;
const MAX_TOTAL_SIZE: usize = 128 * 1024;
const MAX_PAYLOAD_LEN: usize = 32_768;
const SUPPORTED_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitchatPacket {
    pub version: u8,
    pub packet_type: u8,
    pub ttl: u8,
    pub timestamp: u64,
    pub sender_id: [u8; 8],
    pub recipient_id: Option<[u8; 8]>,
    pub payload: Vec<u8>,
    pub signature: Option<[u8; 64]>,
}

/// Compresses if it pays off, builds the header + fields, then pads to the
/// smallest fitting block size (leaving anything over 2048 bytes unpadded).
pub fn encode_packet(packet: &BitchatPacket) -> Result<Vec<u8>> {
    if packet.payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge(packet.payload.len()));
    }

    let (payload_area, is_compressed) = if should_compress(&packet.payload) {
        let compressed = compress(&packet.payload)?;
        let mut area = Vec::with_capacity(2 + compressed.len());
        area.put_u16(packet.payload.len() as u16);
        area.extend_from_slice(&compressed);
        (area, true)
    } else {
        (packet.payload.clone(), false)
    };

    let mut flags = 0u8;
    if packet.recipient_id.is_some() {
        flags |= FLAG_HAS_RECIPIENT;
    }
    if packet.signature.is_some() {
        flags |= FLAG_HAS_SIGNATURE;
    }
    if is_compressed {
        flags |= FLAG_IS_COMPRESSED;
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + SENDER_ID_LEN + payload_area.len() + SIGNATURE_LEN);
    buf.put_u8(packet.version);
    buf.put_u8(packet.packet_type);
    buf.put_u8(packet.ttl);
    buf.put_u64(packet.timestamp);
    buf.put_u8(flags);
    buf.put_u16(payload_area.len() as u16);
    buf.put_slice(&packet.sender_id);
    if let Some(recipient) = packet.recipient_id {
        buf.put_slice(&recipient);
    }
    buf.put_slice(&payload_area);
    if let Some(signature) = packet.signature {
        buf.put_slice(&signature);
    }

    Ok(pad(&buf))
}

/// Heuristically unpads, then parses strictly, rejecting anything out of bounds.
pub fn decode_packet(data: &[u8]) -> Result<BitchatPacket> {
    if data.len() > MAX_TOTAL_SIZE {
        tracing::debug!(size = data.len(), "rejected packet over the 128 KiB cap");
        return Err(Error::TotalSizeExceeded(data.len()));
    }
    let data = unpad(data);

    let mut buf = bytes::Bytes::copy_from_slice(data);
    if buf.remaining() < HEADER_LEN {
        return Err(Error::TooShort {
            needed: HEADER_LEN,
            have: buf.remaining(),
        });
    }
    let version = buf.get_u8();
    if version != SUPPORTED_VERSION {
        tracing::debug!(version, "rejected packet with unsupported version");
        return Err(Error::UnsupportedVersion(version));
    }
    let packet_type = buf.get_u8();
    let ttl = buf.get_u8();
    let timestamp = buf.get_u64();
    let flags = buf.get_u8();
    let payload_len = buf.get_u16() as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge(payload_len));
    }

    if buf.remaining() < SENDER_ID_LEN {
        return Err(Error::FieldOutOfBounds {
            field: "senderID",
            len: SENDER_ID_LEN,
        });
    }
    let mut sender_id = [0u8; 8];
    buf.copy_to_slice(&mut sender_id);

    let recipient_id = if flags & FLAG_HAS_RECIPIENT != 0 {
        if buf.remaining() < RECIPIENT_ID_LEN {
            return Err(Error::FieldOutOfBounds {
                field: "recipientID",
                len: RECIPIENT_ID_LEN,
            });
        }
        let mut recipient = [0u8; 8];
        buf.copy_to_slice(&mut recipient);
        Some(recipient)
    } else {
        None
    };

    if buf.remaining() < payload_len {
        return Err(Error::FieldOutOfBounds {
            field: "payload",
            len: payload_len,
        });
    }
    let mut payload_area = vec![0u8; payload_len];
    buf.copy_to_slice(&mut payload_area);

    let payload = if flags & FLAG_IS_COMPRESSED != 0 {
        if payload_area.len() < 2 {
            return Err(Error::FieldOutOfBounds {
                field: "originalPayloadSize",
                len: 2,
            });
        }
        let original_size = u16::from_be_bytes([payload_area[0], payload_area[1]]) as usize;
        decompress(&payload_area[2..], original_size)?
    } else {
        payload_area
    };

    let signature = if flags & FLAG_HAS_SIGNATURE != 0 {
        if buf.remaining() < SIGNATURE_LEN {
            return Err(Error::FieldOutOfBounds {
                field: "signature",
                len: SIGNATURE_LEN,
            });
        }
        let mut sig = [0u8; 64];
        buf.copy_to_slice(&mut sig);
        Some(sig)
    } else {
        None
    };

    Ok(BitchatPacket {
        version,
        packet_type,
        ttl,
        timestamp,
        sender_id,
        recipient_id,
        payload,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BitchatPacket {
        BitchatPacket {
            version: 1,
            packet_type: 4,
            ttl: 5,
            timestamp: 1_700_000_000,
            sender_id: [1, 2, 3, 4, 5, 6, 7, 8],
            recipient_id: None,
            payload: b"ping".to_vec(),
            signature: None,
        }
    }

    #[test]
    fn small_packet_round_trips_and_lands_on_smallest_block() {
        let packet = sample();
        let encoded = encode_packet(&packet).expect("encodes");
        assert_eq!(encoded.len(), 256);
        let decoded = decode_packet(&encoded).expect("decodes");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn packet_with_recipient_and_signature_round_trips() {
        let packet = BitchatPacket {
            recipient_id: Some([9, 9, 9, 9, 9, 9, 9, 9]),
            signature: Some([7u8; 64]),
            ..sample()
        };
        let encoded = encode_packet(&packet).expect("encodes");
        let decoded = decode_packet(&encoded).expect("decodes");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn repetitive_payload_is_compressed_and_round_trips() {
        let packet = BitchatPacket {
            payload: vec![0x41u8; 512],
            ..sample()
        };
        let encoded = encode_packet(&packet).expect("encodes");
        let decoded = decode_packet(&encoded).expect("decodes");
        assert_eq!(decoded.payload, packet.payload);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let packet = BitchatPacket {
            payload: vec![0u8; MAX_PAYLOAD_LEN + 1],
            ..sample()
        };
        assert!(matches!(
            encode_packet(&packet),
            Err(Error::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn oversized_total_buffer_is_rejected_on_decode() {
        let data = vec![0u8; MAX_TOTAL_SIZE + 1];
        assert!(matches!(
            decode_packet(&data),
            Err(Error::TotalSizeExceeded(_))
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut packet = sample();
        packet.version = 9;
        // build manually since encode_packet does not validate version itself
        let mut buf = BytesMut::new();
        buf.put_u8(9);
        buf.put_u8(packet.packet_type);
        buf.put_u8(packet.ttl);
        buf.put_u64(packet.timestamp);
        buf.put_u8(0);
        buf.put_u16(packet.payload.len() as u16);
        buf.put_slice(&packet.sender_id);
        buf.put_slice(&packet.payload);
        let encoded = pad(&buf);
        assert!(matches!(
            decode_packet(&encoded),
            Err(Error::UnsupportedVersion(9))
        ));
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_small_payloads_round_trip(
            ttl in 0u8..=255u8,
            timestamp in 0u64..=u64::MAX,
            sender_bytes in proptest::collection::vec(0u8..=255u8, 8..9),
            payload in proptest::collection::vec(0u8..=255u8, 0..90),
        ) {
            let mut sender_id = [0u8; 8];
            sender_id.copy_from_slice(&sender_bytes);
            let packet = BitchatPacket {
                version: 1,
                packet_type: 0,
                ttl,
                timestamp,
                sender_id,
                recipient_id: None,
                payload,
                signature: None,
            };
            let encoded = encode_packet(&packet).expect("encodes");
            let decoded = decode_packet(&encoded).expect("decodes");
            proptest::prop_assert_eq!(decoded, packet);
        }
    }
}
