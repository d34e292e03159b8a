//! `BitchatMessage`: the inner payload format carried inside a `BitchatPacket`,
//! with flag-gated optional trailers in a fixed, normative order.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

const FLAG_IS_RELAY: u8 = 0x01;
const FLAG_IS_PRIVATE: u8 = 0x02;
const FLAG_HAS_ORIGINAL_SENDER: u8 = 0x04;
const FLAG_HAS_RECIPIENT_NICKNAME: u8 = 0x08;
const FLAG_HAS_SENDER_PEER_ID: u8 = 0x10;
const FLAG_HAS_MENTIONS: u8 = 0x20;
const FLAG_HAS_CHANNEL: u8 = 0x40;
const FLAG_IS_ENCRYPTED: u8 = 0x80;

/// The inner message record. `content` holds UTF-8 text, or raw ciphertext
/// when `is_encrypted` is set; the codec never interprets it either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitchatMessage {
    pub is_relay: bool,
    pub is_private: bool,
    pub is_encrypted: bool,
    pub timestamp_millis: u64,
    pub id: String,
    pub sender: String,
    pub content: Vec<u8>,
    pub original_sender: Option<String>,
    pub recipient_nickname: Option<String>,
    pub sender_peer_id: Option<String>,
    pub mentions: Vec<String>,
    pub channel: Option<String>,
}

fn flags_of(msg: &BitchatMessage) -> u8 {
    let mut flags = 0u8;
    if msg.is_relay {
        flags |= FLAG_IS_RELAY;
    }
    if msg.is_private {
        flags |= FLAG_IS_PRIVATE;
    }
    if msg.is_encrypted {
        flags |= FLAG_IS_ENCRYPTED;
    }
    if msg.original_sender.is_some() {
        flags |= FLAG_HAS_ORIGINAL_SENDER;
    }
    if msg.recipient_nickname.is_some() {
        flags |= FLAG_HAS_RECIPIENT_NICKNAME;
    }
    if msg.sender_peer_id.is_some() {
        flags |= FLAG_HAS_SENDER_PEER_ID;
    }
    if !msg.mentions.is_empty() {
        flags |= FLAG_HAS_MENTIONS;
    }
    if msg.channel.is_some() {
        flags |= FLAG_HAS_CHANNEL;
    }
    flags
}

fn put_len_prefixed(buf: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    let truncated = &bytes[..bytes.len().min(u8::MAX as usize)];
    buf.put_u8(truncated.len() as u8);
    buf.put_slice(truncated);
}

fn get_len_prefixed(buf: &mut impl Buf, field: &'static str) -> Result<String> {
    if !buf.has_remaining() {
        return Err(Error::FieldOutOfBounds { field, len: 0 });
    }
    let len = buf.get_u8() as usize;
    if buf.remaining() < len {
        return Err(Error::FieldOutOfBounds { field, len });
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| Error::InvalidUtf8(field))
}

/// Encodes the fixed portion, then the optional trailers in flag-bit order:
/// original sender, recipient nickname, sender peer ID, mentions, channel.
pub fn encode_message(msg: &BitchatMessage) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(flags_of(msg));
    buf.put_u64(msg.timestamp_millis);
    put_len_prefixed(&mut buf, &msg.id);
    put_len_prefixed(&mut buf, &msg.sender);

    let content = &msg.content[..msg.content.len().min(u16::MAX as usize)];
    buf.put_u16(content.len() as u16);
    buf.put_slice(content);

    if let Some(s) = &msg.original_sender {
        put_len_prefixed(&mut buf, s);
    }
    if let Some(s) = &msg.recipient_nickname {
        put_len_prefixed(&mut buf, s);
    }
    if let Some(s) = &msg.sender_peer_id {
        put_len_prefixed(&mut buf, s);
    }
    if !msg.mentions.is_empty() {
        let count = msg.mentions.len().min(u8::MAX as usize);
        buf.put_u8(count as u8);
        for m in msg.mentions.iter().take(count) {
            put_len_prefixed(&mut buf, m);
        }
    }
    if let Some(s) = &msg.channel {
        put_len_prefixed(&mut buf, s);
    }

    buf.to_vec()
}

/// Decodes only the fields whose flag bit is set; absent fields decode to `None`/empty.
pub fn decode_message(data: &[u8]) -> Result<BitchatMessage> {
    let mut buf = bytes::Bytes::copy_from_slice(data);

    if buf.remaining() < 1 {
        return Err(Error::TooShort { needed: 1, have: 0 });
    }
    let flags = buf.get_u8();

    if buf.remaining() < 8 {
        return Err(Error::TooShort {
            needed: 8,
            have: buf.remaining(),
        });
    }
    let timestamp_millis = buf.get_u64();

    let id = get_len_prefixed(&mut buf, "id")?;
    let sender = get_len_prefixed(&mut buf, "sender")?;

    if buf.remaining() < 2 {
        return Err(Error::TooShort {
            needed: 2,
            have: buf.remaining(),
        });
    }
    let content_len = buf.get_u16() as usize;
    if buf.remaining() < content_len {
        return Err(Error::FieldOutOfBounds {
            field: "content",
            len: content_len,
        });
    }
    let mut content = vec![0u8; content_len];
    buf.copy_to_slice(&mut content);

    let original_sender = if flags & FLAG_HAS_ORIGINAL_SENDER != 0 {
        Some(get_len_prefixed(&mut buf, "originalSender")?)
    } else {
        None
    };
    let recipient_nickname = if flags & FLAG_HAS_RECIPIENT_NICKNAME != 0 {
        Some(get_len_prefixed(&mut buf, "recipientNickname")?)
    } else {
        None
    };
    let sender_peer_id = if flags & FLAG_HAS_SENDER_PEER_ID != 0 {
        Some(get_len_prefixed(&mut buf, "senderPeerID")?)
    } else {
        None
    };
    let mentions = if flags & FLAG_HAS_MENTIONS != 0 {
        if buf.remaining() < 1 {
            return Err(Error::FieldOutOfBounds {
                field: "mentions",
                len: 0,
            });
        }
        let count = buf.get_u8() as usize;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(get_len_prefixed(&mut buf, "mentions")?);
        }
        out
    } else {
        Vec::new()
    };
    let channel = if flags & FLAG_HAS_CHANNEL != 0 {
        Some(get_len_prefixed(&mut buf, "channel")?)
    } else {
        None
    };

    Ok(BitchatMessage {
        is_relay: flags & FLAG_IS_RELAY != 0,
        is_private: flags & FLAG_IS_PRIVATE != 0,
        is_encrypted: flags & FLAG_IS_ENCRYPTED != 0,
        timestamp_millis,
        id,
        sender,
        content,
        original_sender,
        recipient_nickname,
        sender_peer_id,
        mentions,
        channel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BitchatMessage {
        BitchatMessage {
            is_relay: false,
            is_private: true,
            is_encrypted: false,
            timestamp_millis: 1_700_000_000_000,
            id: "msg-1".into(),
            sender: "alice".into(),
            content: b"hello bob".to_vec(),
            original_sender: None,
            recipient_nickname: Some("bob".into()),
            sender_peer_id: Some("peer-abc".into()),
            mentions: vec!["bob".into(), "carol".into()],
            channel: None,
        }
    }

    #[test]
    fn round_trips_with_a_mix_of_optional_fields() {
        let msg = sample();
        let encoded = encode_message(&msg);
        let decoded = decode_message(&encoded).expect("decodes");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn absent_optional_fields_decode_as_none_or_empty() {
        let msg = BitchatMessage {
            recipient_nickname: None,
            sender_peer_id: None,
            mentions: Vec::new(),
            ..sample()
        };
        let decoded = decode_message(&encode_message(&msg)).expect("decodes");
        assert_eq!(decoded.recipient_nickname, None);
        assert_eq!(decoded.sender_peer_id, None);
        assert!(decoded.mentions.is_empty());
    }

    #[test]
    fn truncated_buffer_is_a_decode_error() {
        let msg = sample();
        let encoded = encode_message(&msg);
        let truncated = &encoded[..encoded.len() - 3];
        assert!(decode_message(truncated).is_err());
    }

    #[test]
    fn channel_flag_round_trips() {
        let msg = BitchatMessage {
            channel: Some("#general".into()),
            ..sample()
        };
        let decoded = decode_message(&encode_message(&msg)).expect("decodes");
        assert_eq!(decoded.channel.as_deref(), Some("#general"));
    }
}
