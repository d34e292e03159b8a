//! Collaborator contracts the core consumes rather than implements: secret
//! storage, a clock, an RNG, a security event sink, and the sealed key-exchange
//! hook. Production code wires in its own `SecretStore`/`Clock`; tests use the
//! in-memory/system implementations below.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand_core::RngCore;

use crate::error::{Error, Result};

/// Durable storage for the local static key, channel passwords, and epoch
/// records. `enumerate` drives epoch-record sweeps keyed by `"epoch::<channel>"`.
pub trait SecretStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, id: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, id: &str) -> Result<()>;
    fn enumerate(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

/// Monotonic time for session/rate-limiter bookkeeping, plus wall-clock time for
/// the channel-key-packet freshness check, which must agree across peers.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    /// Milliseconds since the Unix epoch.
    fn unix_millis(&self) -> u64;
}

/// Cryptographic randomness. Abstracted so tests can inject deterministic bytes
/// without touching the OS RNG used everywhere else in this crate.
pub trait Rng: Send + Sync {
    fn fill_bytes(&self, buf: &mut [u8]);

    fn bytes_32(&self) -> [u8; 32] {
        let mut b = [0u8; 32];
        self.fill_bytes(&mut b);
        b
    }

    fn bytes_16(&self) -> [u8; 16] {
        let mut b = [0u8; 16];
        self.fill_bytes(&mut b);
        b
    }

    fn bytes_12(&self) -> [u8; 12] {
        let mut b = [0u8; 12];
        self.fill_bytes(&mut b);
        b
    }
}

/// Security-relevant events the core reports but does not act on beyond what's
/// specified; surrounding code decides how to surface them (metrics, logs, UI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    InvalidKey,
    ReplayAttackDetected(String),
    RateLimited,
}

pub trait SecurityLog: Send + Sync {
    fn log(&self, event: SecurityEvent);
}

/// Default `Clock` backed by `Instant`/`SystemTime`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the Unix epoch")
            .as_millis() as u64
    }
}

/// Default `Rng` backed by the OS CSPRNG.
pub struct OsRng;

impl Rng for OsRng {
    fn fill_bytes(&self, buf: &mut [u8]) {
        rand_core::OsRng.fill_bytes(buf);
    }
}

/// In-memory `SecretStore` for tests and single-process deployments without
/// their own keychain integration.
#[derive(Default)]
pub struct InMemorySecretStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for InMemorySecretStore {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().expect("lock poisoned").get(id).cloned())
    }

    fn put(&self, id: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(id.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.entries.write().expect("lock poisoned").remove(id);
        Ok(())
    }

    fn enumerate(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Collects events for test assertions instead of dispatching them anywhere.
#[derive(Default)]
pub struct RecordingSecurityLog {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingSecurityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().expect("lock poisoned").clone()
    }
}

impl SecurityLog for RecordingSecurityLog {
    fn log(&self, event: SecurityEvent) {
        self.events.lock().expect("lock poisoned").push(event);
    }
}

/// Sealed so only this crate can add a key-exchange algorithm; the reserved
/// shape (public-key length, combined-secret HKDF over concatenated secrets)
/// is what a future hybrid/post-quantum exchange would plug into, without
/// giving downstream crates a way to implement a spoofed or weakened exchange.
mod sealed {
    pub trait Sealed {}
}

/// A Diffie-Hellman-shaped key exchange. Present today only as `Classical`;
/// the sealed supertrait is the hook a hybrid exchange would extend.
pub trait KeyExchange: sealed::Sealed {
    /// Serialised public-key length in bytes.
    const PUBLIC_KEY_LEN: usize;

    fn generate() -> Self
    where
        Self: Sized;
    fn public_key(&self) -> Vec<u8>;
    fn diffie_hellman(&self, their_public: &[u8]) -> Result<[u8; 32]>;
}

/// The classical Curve25519 exchange used by every pattern this crate implements.
#[cfg(feature = "classic")]
pub struct Classical {
    secret: crate::primitives::dh::StaticKeyPair,
}

#[cfg(feature = "classic")]
impl sealed::Sealed for Classical {}

#[cfg(feature = "classic")]
impl KeyExchange for Classical {
    const PUBLIC_KEY_LEN: usize = 32;

    fn generate() -> Self {
        Self {
            secret: crate::primitives::dh::StaticKeyPair::generate(),
        }
    }

    fn public_key(&self) -> Vec<u8> {
        self.secret.public.as_bytes().to_vec()
    }

    fn diffie_hellman(&self, their_public: &[u8]) -> Result<[u8; 32]> {
        let validated = crate::validator::validate_public_key(their_public)?;
        let public = x25519_dalek::PublicKey::from(validated);
        Ok(crate::primitives::dh::dh_static(&self.secret.secret, &public))
    }
}
