//! Noise Protocol Framework engine (XX/IK/NK over Curve25519, ChaCha20-Poly1305,
//! SHA-256), session management, channel encryption with epoched key rotation,
//! and the security enforcement (validation, rate limiting) that a
//! peer-to-peer encrypted mesh chat needs from its cryptographic core.
//!
//! Layering follows the dependency direction `primitives -> cipher_state ->
//! symmetric_state -> handshake_state -> session -> session_manager ->
//! secure_session`, with `channel`/`key_rotation` built on `primitives` and
//! `validator`, and `rate_limiter`/`validator` as leaves.

#![forbid(unsafe_code)]

pub mod cipher_state;
pub mod channel;
pub mod collaborators;
pub mod error;
pub mod handshake_state;
pub mod key_rotation;
pub mod primitives;
pub mod rate_limiter;
pub mod secure_session;
pub mod session;
pub mod session_manager;
pub mod symmetric_state;
pub mod validator;

pub use error::{Error, Result};
