//! Binary wire codec for a peer-to-peer encrypted mesh chat: the outer
//! `BitchatPacket` (header, optional recipient, compressed/padded payload,
//! optional signature) and the inner `BitchatMessage` it carries.
//!
//! `packet` depends on `padding` and `compression` for its own framing;
//! `message` is encoded/decoded independently and carried opaquely inside a
//! packet's `payload` by callers that choose to nest it there.

#![forbid(unsafe_code)]

pub mod compression;
pub mod error;
pub mod message;
pub mod packet;
pub mod padding;

pub use error::{Error, Result};
pub use message::{decode_message, encode_message, BitchatMessage};
pub use packet::{decode_packet, encode_packet, BitchatPacket};
