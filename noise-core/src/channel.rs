//! Password-derived group channel keys, AEAD-framed channel messages, and
//! replay-protected key-sharing packets.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::collaborators::{Clock, Rng, SecretStore, SecurityEvent, SecurityLog};
use crate::error::{Error, Result};
use crate::primitives::{aead_open, aead_seal, pbkdf2_sha256};
use crate::validator::validate_channel_name;

/// Channel-message AEAD framing: `nonce(12) || ciphertext || tag(16)`, so the
/// minimum valid buffer is 28 bytes (an empty plaintext still carries a tag).
const MIN_ENCRYPTED_LEN: usize = 12 + 16;
const FIVE_MINUTES_MILLIS: u64 = 5 * 60 * 1000;
const REPLAY_CACHE_CLEAR_THRESHOLD: usize = 1_000;

/// A channel key-sharing record, serialised as a self-describing JSON record
/// rather than a flat binary layout since it only ever crosses the channel
/// (already encrypted end to end by the transport's own session), not the
/// traffic-analysis-sensitive outer packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelKeyPacket {
    pub channel: String,
    pub password: String,
    pub timestamp_millis: u64,
    /// 16 random bytes, base64-encoded.
    pub nonce: String,
}

/// Derives and caches PBKDF2 channel keys, encrypts/decrypts channel traffic,
/// and processes key-sharing packets against a replay window.
pub struct ChannelEncryption {
    secret_store: Arc<dyn SecretStore>,
    rng: Arc<dyn Rng>,
    clock: Arc<dyn Clock>,
    security_log: Arc<dyn SecurityLog>,
    keys: RwLock<HashMap<String, [u8; 32]>>,
    received_nonces: RwLock<HashMap<String, u64>>,
}

impl ChannelEncryption {
    pub fn new(
        secret_store: Arc<dyn SecretStore>,
        rng: Arc<dyn Rng>,
        clock: Arc<dyn Clock>,
        security_log: Arc<dyn SecurityLog>,
    ) -> Self {
        Self {
            secret_store,
            rng,
            clock,
            security_log,
            keys: RwLock::new(HashMap::new()),
            received_nonces: RwLock::new(HashMap::new()),
        }
    }

    fn salt(channel: &str, creator_fp: Option<&str>) -> String {
        match creator_fp {
            Some(fp) => format!("bitchat-channel-{channel}-{fp}"),
            None => format!("bitchat-channel-{channel}"),
        }
    }

    /// Derives the channel key from `pw`, caches it, and persists `pw` itself
    /// via the secret store so it survives a restart.
    pub fn set_channel_password(
        &self,
        password: &str,
        channel: &str,
        creator_fp: Option<&str>,
    ) -> Result<()> {
        validate_channel_name(channel)?;
        let key = pbkdf2_sha256(password.as_bytes(), Self::salt(channel, creator_fp).as_bytes());
        self.keys
            .write()
            .expect("lock poisoned")
            .insert(channel.to_string(), key);
        self.secret_store
            .put(&format!("channel-password::{channel}"), password.as_bytes())
    }

    pub fn get_channel_key(&self, channel: &str) -> Option<[u8; 32]> {
        self.keys.read().expect("lock poisoned").get(channel).copied()
    }

    pub fn remove_channel_password(&self, channel: &str) -> Result<()> {
        self.keys.write().expect("lock poisoned").remove(channel);
        self.secret_store.delete(&format!("channel-password::{channel}"))
    }

    /// `nonce(12) || seal(text) || tag(16)`.
    pub fn encrypt_channel_message(&self, text: &str, channel: &str) -> Result<Vec<u8>> {
        let key = self.get_channel_key(channel).ok_or(Error::NoChannelKey)?;
        let nonce = self.rng.bytes_12();
        let ct = aead_seal(&key, &nonce, &[], text.as_bytes());
        let mut out = Vec::with_capacity(12 + ct.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    /// Reverses `encrypt_channel_message`. Requires `buf.len() >= 28`.
    pub fn decrypt_channel_message(&self, buf: &[u8], channel: &str) -> Result<String> {
        if buf.len() < MIN_ENCRYPTED_LEN {
            return Err(Error::DecryptionFailed);
        }
        let key = self.get_channel_key(channel).ok_or(Error::NoChannelKey)?;
        let (nonce, ct) = buf.split_at(12);
        let nonce: [u8; 12] = nonce.try_into().expect("split_at(12) yields 12 bytes");
        let pt = aead_open(&key, &nonce, &[], ct).map_err(|_| Error::DecryptionFailed)?;
        String::from_utf8(pt).map_err(|_| Error::DecryptionFailed)
    }

    /// Builds a key-sharing packet carrying `pw` for `channel`, timestamped now.
    pub fn create_channel_key_packet(&self, password: &str, channel: &str) -> ChannelKeyPacket {
        use base64::Engine;
        let nonce = self.rng.bytes_16();
        ChannelKeyPacket {
            channel: channel.to_string(),
            password: password.to_string(),
            timestamp_millis: self.clock.unix_millis(),
            nonce: base64::engine::general_purpose::STANDARD.encode(nonce),
        }
    }

    /// Validates freshness and replay, then returns `(channel, password)`.
    /// Clears the entire replay cache once it exceeds 1000 entries, per the
    /// core's bounded-cache-as-TTL-approximation design.
    pub fn process_channel_key_packet(&self, packet: &ChannelKeyPacket) -> Result<(String, String)> {
        let now = self.clock.unix_millis();
        if now.saturating_sub(packet.timestamp_millis) >= FIVE_MINUTES_MILLIS {
            return Err(Error::StalePacket);
        }

        let mut nonces = self.received_nonces.write().expect("lock poisoned");
        if nonces.contains_key(&packet.nonce) {
            tracing::warn!(channel = %packet.channel, "SECURITY: replayed channel key packet nonce");
            self.security_log
                .log(SecurityEvent::ReplayAttackDetected(packet.channel.clone()));
            return Err(Error::ReplayDetected(packet.channel.clone()));
        }
        if nonces.len() > REPLAY_CACHE_CLEAR_THRESHOLD {
            nonces.clear();
        }
        nonces.insert(packet.nonce.clone(), now);

        Ok((packet.channel.clone(), packet.password.clone()))
    }

    /// The external periodic nonce-cache cleanup task hosting code is expected
    /// to drive. Applies the same bulk-clear-above-threshold rule
    /// `process_channel_key_packet` already enforces inline; hosting code calls
    /// this on its own ~5-minute tick so the cache is bounded even for channels
    /// that stop receiving new packets.
    pub fn cleanup_expired_nonces(&self) {
        let mut nonces = self.received_nonces.write().expect("lock poisoned");
        if nonces.len() > REPLAY_CACHE_CLEAR_THRESHOLD {
            nonces.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemorySecretStore, RecordingSecurityLog, SystemClock};

    fn test_rig() -> ChannelEncryption {
        ChannelEncryption::new(
            Arc::new(InMemorySecretStore::new()),
            Arc::new(crate::collaborators::OsRng),
            Arc::new(SystemClock),
            Arc::new(RecordingSecurityLog::new()),
        )
    }

    #[test]
    fn message_round_trips_under_shared_password() {
        let ce = test_rig();
        ce.set_channel_password("hunter2", "#general", None).expect("sets");
        let ct = ce
            .encrypt_channel_message("hello channel", "#general")
            .expect("encrypts");
        let pt = ce.decrypt_channel_message(&ct, "#general").expect("decrypts");
        assert_eq!(pt, "hello channel");
    }

    #[test]
    fn missing_key_is_reported() {
        let ce = test_rig();
        assert!(matches!(
            ce.encrypt_channel_message("x", "#nokey"),
            Err(Error::NoChannelKey)
        ));
    }

    #[test]
    fn short_buffer_rejected() {
        let ce = test_rig();
        ce.set_channel_password("pw", "#general", None).expect("sets");
        assert!(matches!(
            ce.decrypt_channel_message(&[0u8; 10], "#general"),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn replay_detected_on_second_delivery() {
        let ce = test_rig();
        let packet = ce.create_channel_key_packet("pw", "#general");
        let first = ce.process_channel_key_packet(&packet);
        assert!(first.is_ok());
        let second = ce.process_channel_key_packet(&packet);
        assert!(matches!(second, Err(Error::ReplayDetected(_))));
    }

    #[test]
    fn stale_packet_rejected() {
        let ce = test_rig();
        let mut packet = ce.create_channel_key_packet("pw", "#general");
        packet.timestamp_millis = 0;
        assert!(matches!(
            ce.process_channel_key_packet(&packet),
            Err(Error::StalePacket)
        ));
    }

    #[test]
    fn different_creator_fingerprints_derive_different_keys() {
        let ce = test_rig();
        ce.set_channel_password("pw", "#general", Some("fp-a")).expect("sets");
        let key_a = ce.get_channel_key("#general").expect("has key");
        ce.set_channel_password("pw", "#general", Some("fp-b")).expect("sets");
        let key_b = ce.get_channel_key("#general").expect("has key");
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn cleanup_clears_cache_once_over_threshold() {
        let ce = test_rig();
        for i in 0..=REPLAY_CACHE_CLEAR_THRESHOLD {
            ce.received_nonces
                .write()
                .expect("lock poisoned")
                .insert(format!("nonce-{i}"), i as u64);
        }
        ce.cleanup_expired_nonces();
        assert!(ce.received_nonces.read().expect("lock poisoned").is_empty());
    }
}
