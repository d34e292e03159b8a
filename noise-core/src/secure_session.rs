//! Wraps a `Session` with age, message-count, and size caps, and the
//! 90%-threshold renegotiation signal the session manager polls.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::validator::MAX_MESSAGE_SIZE;

/// 24 hours.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
/// 10^9 messages.
pub const MAX_MESSAGES_PER_SESSION: u64 = 1_000_000_000;
/// Renegotiate once `msgCount >= REKEY_THRESHOLD_NUM / REKEY_THRESHOLD_DEN * max`.
const REKEY_THRESHOLD_NUM: u64 = 9;
const REKEY_THRESHOLD_DEN: u64 = 10;

/// `SecureSession` adds `(start, lastActivity, msgCount)` to a `Session`.
pub struct SecureSession {
    pub(crate) inner: Session,
    start: Instant,
    last_activity: Instant,
    msg_count: u64,
}

impl SecureSession {
    pub(crate) fn new(inner: Session, now: Instant) -> Self {
        Self {
            inner,
            start: now,
            last_activity: now,
            msg_count: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.inner
    }

    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.start) > SESSION_TIMEOUT
    }

    /// How long this session has existed, for the caller-enforced incomplete-
    /// handshake timeout in the core's concurrency model (the core exposes
    /// enough state to detect this; it does not run the timer itself).
    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.start)
    }

    /// `needsRenegotiation()`: true at 90% of the message budget or past the
    /// session timeout since last activity.
    pub fn needs_renegotiation(&self, now: Instant) -> bool {
        self.msg_count >= (MAX_MESSAGES_PER_SESSION * REKEY_THRESHOLD_NUM) / REKEY_THRESHOLD_DEN
            || now.duration_since(self.last_activity) > SESSION_TIMEOUT
    }

    /// Test hook mirroring the spec's scenario 6 ("set msgCount via the test hook").
    #[doc(hidden)]
    pub fn set_message_count_for_test(&mut self, count: u64) {
        self.msg_count = count;
    }

    pub fn encrypt(&mut self, now: Instant, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.expired(now) {
            return Err(Error::SessionExpired);
        }
        if self.msg_count >= MAX_MESSAGES_PER_SESSION {
            return Err(Error::SessionExhausted);
        }
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge);
        }
        let ct = self.inner.encrypt(plaintext)?;
        self.msg_count += 1;
        self.last_activity = now;
        Ok(ct)
    }

    pub fn decrypt(&mut self, now: Instant, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if self.expired(now) {
            return Err(Error::SessionExpired);
        }
        if self.msg_count >= MAX_MESSAGES_PER_SESSION {
            return Err(Error::SessionExhausted);
        }
        if ciphertext.len() > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge);
        }
        let pt = self.inner.decrypt(ciphertext)?;
        self.msg_count += 1;
        self.last_activity = now;
        Ok(pt)
    }
}
