//! Chaining key, running handshake hash, and the AEAD cipher they protect.

use crate::cipher_state::CipherState;
use crate::error::Result;
use crate::primitives::{hkdf2, hkdf3, sha256};

/// `(ck: 32 bytes, h: 32 bytes, cs: CipherState)`.
pub struct SymmetricState {
    chaining_key: [u8; 32],
    handshake_hash: [u8; 32],
    cipher: CipherState,
}

impl SymmetricState {
    /// Initializes `h` from the protocol name (zero-padded if it fits in 32 bytes,
    /// else SHA-256-hashed), `ck = h`, and an empty `CipherState`.
    pub fn initialize(protocol_name: &str) -> Self {
        let name_bytes = protocol_name.as_bytes();
        let h = if name_bytes.len() <= 32 {
            let mut padded = [0u8; 32];
            padded[..name_bytes.len()].copy_from_slice(name_bytes);
            padded
        } else {
            sha256(name_bytes)
        };
        Self {
            chaining_key: h,
            handshake_hash: h,
            cipher: CipherState::new(),
        }
    }

    /// The running handshake hash, usable as a channel-binding value once complete.
    pub fn handshake_hash(&self) -> [u8; 32] {
        self.handshake_hash
    }

    /// Whether the transport cipher has been keyed yet (governs the wire length
    /// of a subsequent `s` token: 32 bytes unkeyed, 48 bytes once AEAD-sealed).
    pub fn is_keyed(&self) -> bool {
        self.cipher.has_key()
    }

    /// `mixKey(ikm)`: derives a new chaining key and keys the cipher state.
    pub fn mix_key(&mut self, ikm: &[u8]) {
        let (new_ck, new_k) = hkdf2(&self.chaining_key, ikm);
        self.chaining_key = new_ck;
        self.cipher.initialize_key(new_k);
    }

    /// `mixHash(d)`: folds arbitrary data into the transcript hash.
    pub fn mix_hash(&mut self, data: &[u8]) {
        let mut buf = Vec::with_capacity(32 + data.len());
        buf.extend_from_slice(&self.handshake_hash);
        buf.extend_from_slice(data);
        self.handshake_hash = sha256(&buf);
    }

    /// `mixKeyAndHash(ikm)`: derives a chaining key, an extra hash input, and a cipher key.
    pub fn mix_key_and_hash(&mut self, ikm: &[u8]) {
        let (new_ck, temp_h, new_k) = hkdf3(&self.chaining_key, ikm);
        self.chaining_key = new_ck;
        self.mix_hash(&temp_h);
        self.cipher.initialize_key(new_k);
    }

    /// `encryptAndHash(pt)`: AEAD-seals under the transcript hash as AD if keyed,
    /// otherwise passes the plaintext through and still folds it into the transcript.
    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.cipher.has_key() {
            let ad = self.handshake_hash;
            let ct = self.cipher.encrypt(&ad, plaintext)?;
            self.mix_hash(&ct);
            Ok(ct)
        } else {
            self.mix_hash(plaintext);
            Ok(plaintext.to_vec())
        }
    }

    /// `decryptAndHash(ct)`: symmetric inverse of `encryptAndHash`.
    pub fn decrypt_and_hash(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if self.cipher.has_key() {
            let ad = self.handshake_hash;
            let pt = self.cipher.decrypt(&ad, data)?;
            self.mix_hash(data);
            Ok(pt)
        } else {
            self.mix_hash(data);
            Ok(data.to_vec())
        }
    }

    /// `split()`: derives the pair of transport cipher states from the final chaining key.
    pub fn split(&self) -> (CipherState, CipherState) {
        let (k1, k2) = hkdf2(&self.chaining_key, &[]);
        let mut cs1 = CipherState::new();
        cs1.initialize_key(k1);
        let mut cs2 = CipherState::new();
        cs2.initialize_key(k2);
        (cs1, cs2)
    }
}
