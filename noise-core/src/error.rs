//! Crate-wide error taxonomy.
//!
//! Variants are grouped to match the kinds named in the core specification's error
//! handling design, not split into one enum per component: callers match on kind,
//! not on which module raised it.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

/// All error kinds the core can raise.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // -- Handshake --
    /// A handshake message was malformed or too short to contain its next token.
    #[error("invalid handshake message: {0}")]
    InvalidMessage(String),
    /// A `s` token failed to authenticate during decryptAndHash.
    #[error("handshake authentication failure")]
    AuthenticationFailure,
    /// A DH or encrypt/decrypt step ran without the keys it needs.
    #[error("missing keys required for this handshake step: {0}")]
    MissingKeys(String),
    /// The local static key was required but not supplied.
    #[error("missing local static key")]
    MissingLocalStaticKey,
    /// A remote public key failed validation (low-order point, wrong length, or garbage).
    #[error("invalid public key")]
    InvalidPublicKey,
    /// `writeMessage` called after the pattern's token stream is exhausted.
    #[error("handshake already complete")]
    HandshakeComplete,
    /// An operation required a completed handshake but it is still in progress.
    #[error("handshake not complete")]
    HandshakeNotComplete,

    // -- Cipher --
    /// Encrypt/decrypt attempted before `initializeKey`.
    #[error("cipher state has no key")]
    UninitializedCipher,
    /// Ciphertext shorter than the AEAD tag.
    #[error("ciphertext too short to contain a tag")]
    InvalidCiphertext,

    // -- Session --
    /// An operation requires a different session state than the current one.
    #[error("invalid session state for this operation")]
    InvalidState,
    /// `encrypt`/`decrypt` called before the session is `Established`.
    #[error("session not established")]
    NotEstablished,
    /// No session exists for the requested peer.
    #[error("no session for peer")]
    SessionNotFound,
    /// An inbound handshake message arrived for a peer that already has an
    /// `Established` session and is not a restart.
    #[error("session already established")]
    AlreadyEstablished,
    /// Wraps the underlying handshake failure kind.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    // -- Security caps --
    /// Session exceeded its configured lifetime.
    #[error("session expired")]
    SessionExpired,
    /// Session exceeded its configured message budget (or nonce space).
    #[error("session exhausted")]
    SessionExhausted,
    /// Plaintext or ciphertext exceeded the configured size cap.
    #[error("message too large")]
    MessageTooLarge,
    /// Peer ID failed validator rules.
    #[error("invalid peer id")]
    InvalidPeerId,
    /// Channel name failed validator rules.
    #[error("invalid channel name")]
    InvalidChannelName,
    /// Rate limiter rejected the request.
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    /// A handshake took longer than the caller-enforced timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,

    // -- Channel --
    /// No key is cached or derivable for the requested channel.
    #[error("no channel key")]
    NoChannelKey,
    /// Channel-key-packet decryption or decoding failed.
    #[error("channel decryption failed")]
    DecryptionFailed,
    /// A channel-key-packet nonce was seen before within the replay window.
    #[error("replay detected for channel {0}")]
    ReplayDetected(String),
    /// A channel-key-packet's timestamp is outside the freshness window.
    #[error("channel key packet is stale")]
    StalePacket,

    // -- Collaborators --
    /// The `SecretStore` collaborator returned an error.
    #[error("secret store error: {0}")]
    SecretStore(String),
    /// A value read back from `SecretStore` could not be parsed.
    #[error("corrupt stored record: {0}")]
    CorruptRecord(String),
}
