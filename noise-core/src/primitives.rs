//! Curve25519 key agreement, ChaCha20-Poly1305 AEAD, SHA-256, HMAC, the
//! Noise-exact HKDF, and PBKDF2-HMAC-SHA256, gathered behind a small surface so
//! the layers above never reach for a crypto crate directly.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// PBKDF2-HMAC-SHA256 iteration count used for channel and epoch key derivation.
pub const PBKDF2_ITERATIONS: u32 = 210_000;

/// `SHA-256(data)`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

/// `HMAC-SHA256(key, data)`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// PBKDF2-HMAC-SHA256 with the spec's fixed iteration count and 32-byte output.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ITERATIONS, &mut out);
    out
}

/// Noise's HKDF: `temp = HMAC(ck, ikm); out_i = HMAC(temp, out_{i-1} || byte(i))`.
///
/// `num_outputs` must be 2 or 3; this mirrors exactly what `SymmetricState`'s
/// `mixKey`/`mixKeyAndHash`/`split` need and nothing more.
fn noise_hkdf(chaining_key: &[u8; 32], ikm: &[u8], num_outputs: usize) -> Vec<[u8; 32]> {
    debug_assert!(num_outputs == 2 || num_outputs == 3);
    let temp = hmac_sha256(chaining_key, ikm);
    // Hkdf::from_prk's `expand(info=[], okm)` produces exactly
    // T1 || T2 || ... with T_i = HMAC(PRK, T_{i-1} || counter_byte(i)),
    // i.e. the same recursion as Noise's HKDF with an empty `info` label.
    let hk = Hkdf::<Sha256>::from_prk(&temp).expect("32-byte PRK is always valid for SHA-256");
    let mut okm = vec![0u8; 32 * num_outputs];
    hk.expand(&[], &mut okm)
        .expect("output length is a small multiple of the hash length");
    okm.chunks_exact(32)
        .map(|c| c.try_into().expect("chunk is 32 bytes"))
        .collect()
}

/// Two-output form used by `mixKey` and `split`.
pub fn hkdf2(chaining_key: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
    let out = noise_hkdf(chaining_key, ikm, 2);
    (out[0], out[1])
}

/// Three-output form used by `mixKeyAndHash`.
pub fn hkdf3(chaining_key: &[u8; 32], ikm: &[u8]) -> ([u8; 32], [u8; 32], [u8; 32]) {
    let out = noise_hkdf(chaining_key, ikm, 3);
    (out[0], out[1], out[2])
}

/// Builds the 12-byte AEAD nonce `[0x00 x 4 || LE(nonce, 8 bytes)]` the spec mandates.
pub fn aead_nonce(counter: u64) -> [u8; 12] {
    let mut n = [0u8; 12];
    n[4..].copy_from_slice(&counter.to_le_bytes());
    n
}

/// Raw ChaCha20-Poly1305 seal. Callers own nonce-uniqueness and counter bookkeeping;
/// this function is a thin, stateless wrapper.
pub fn aead_seal(key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .expect("ChaCha20-Poly1305 sealing is infallible for well-formed inputs")
}

/// Raw ChaCha20-Poly1305 open. Returns `AuthenticationFailure` on tag mismatch.
pub fn aead_open(key: &[u8; 32], nonce: &[u8; 12], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| Error::AuthenticationFailure)
}

/// Curve25519 Diffie-Hellman, gated behind the `classic` feature (the only
/// `KeyExchange` implementation shipped today; see `collaborators::sealed`).
#[cfg(feature = "classic")]
pub mod dh {
    use rand_core::OsRng;
    use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

    /// A Curve25519 static (long-lived) key pair.
    pub struct StaticKeyPair {
        pub secret: StaticSecret,
        pub public: PublicKey,
    }

    impl Clone for StaticKeyPair {
        fn clone(&self) -> Self {
            Self {
                secret: self.secret.clone(),
                public: self.public,
            }
        }
    }

    impl StaticKeyPair {
        /// Generates a fresh key pair from the OS RNG.
        pub fn generate() -> Self {
            let secret = StaticSecret::random_from_rng(OsRng);
            let public = PublicKey::from(&secret);
            Self { secret, public }
        }

        /// Reconstructs a key pair from a stored 32-byte scalar.
        pub fn from_bytes(bytes: [u8; 32]) -> Self {
            let secret = StaticSecret::from(bytes);
            let public = PublicKey::from(&secret);
            Self { secret, public }
        }
    }

    /// A Curve25519 ephemeral key, used for exactly one handshake.
    pub struct EphemeralKeyPair {
        pub secret: Option<EphemeralSecret>,
        pub public: PublicKey,
    }

    impl EphemeralKeyPair {
        /// Generates a fresh ephemeral key pair from the OS RNG.
        pub fn generate() -> Self {
            let secret = EphemeralSecret::random_from_rng(OsRng);
            let public = PublicKey::from(&secret);
            Self {
                secret: Some(secret),
                public,
            }
        }

        /// Consumes the ephemeral secret in a DH with a peer's static secret,
        /// as needed for the `ee` token against a static responder key in tests.
        pub fn diffie_hellman(&mut self, their_public: &PublicKey) -> [u8; 32] {
            let secret = self
                .secret
                .take()
                .expect("ephemeral secret used at most once per Noise pattern");
            secret.diffie_hellman(their_public).to_bytes()
        }
    }

    /// DH between a static secret and any public key (`se`, `ss`, or the
    /// responder's `ee`/`es` side).
    pub fn dh_static(secret: &StaticSecret, their_public: &PublicKey) -> [u8; 32] {
        secret.diffie_hellman(their_public).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hkdf2_matches_manual_noise_recursion() {
        let ck = [0x11u8; 32];
        let ikm = b"input key material";
        let temp = hmac_sha256(&ck, ikm);
        let out1 = hmac_sha256(&temp, &[0x01]);
        let mut buf2 = out1.to_vec();
        buf2.push(0x02);
        let out2 = hmac_sha256(&temp, &buf2);
        let (a, b) = hkdf2(&ck, ikm);
        assert_eq!(a, out1);
        assert_eq!(b, out2);
    }

    #[test]
    fn hkdf3_extends_hkdf2() {
        let ck = [0x22u8; 32];
        let ikm = b"more ikm";
        let (a2, b2) = hkdf2(&ck, ikm);
        let (a3, b3, _c3) = hkdf3(&ck, ikm);
        assert_eq!(a2, a3);
        assert_eq!(b2, b3);
    }

    #[test]
    fn aead_roundtrip() {
        let key = [0x42u8; 32];
        let nonce = aead_nonce(7);
        let ct = aead_seal(&key, &nonce, b"aad", b"hello");
        let pt = aead_open(&key, &nonce, b"aad", &ct).expect("authenticates");
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn aead_tamper_detected() {
        let key = [0x42u8; 32];
        let nonce = aead_nonce(1);
        let mut ct = aead_seal(&key, &nonce, b"aad", b"hello");
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(aead_open(&key, &nonce, b"aad", &ct).is_err());
    }

    #[test]
    fn pbkdf2_is_deterministic_per_salt() {
        let a = pbkdf2_sha256(b"password", b"salt-one");
        let b = pbkdf2_sha256(b"password", b"salt-one");
        let c = pbkdf2_sha256(b"password", b"salt-two");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
