//! A single AEAD key plus a strictly monotonic 64-bit nonce counter.

use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::primitives::{aead_nonce, aead_open, aead_seal};

/// `(key?: 32 bytes, nonce: u64)`. Refuses to encrypt or decrypt with no key set;
/// the nonce only advances on a successful operation.
#[derive(Clone)]
pub struct CipherState {
    key: Option<[u8; 32]>,
    nonce: u64,
}

impl Default for CipherState {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherState {
    /// An uninitialized cipher state: no key, nonce at zero.
    pub fn new() -> Self {
        Self {
            key: None,
            nonce: 0,
        }
    }

    /// Sets the key and resets the nonce counter to zero.
    pub fn initialize_key(&mut self, key: [u8; 32]) {
        self.key = Some(key);
        self.nonce = 0;
    }

    /// Whether a key has been set.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Current nonce value (number of successful operations since the last key set).
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// `encrypt(pt, ad) -> ct || tag`. Advances the nonce only on success.
    pub fn encrypt(&mut self, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.key.as_ref().ok_or(Error::UninitializedCipher)?;
        let next_nonce = self.nonce.checked_add(1).ok_or(Error::SessionExhausted)?;
        let ct = aead_seal(key, &aead_nonce(self.nonce), ad, plaintext);
        self.nonce = next_nonce;
        Ok(ct)
    }

    /// `decrypt(ct || tag, ad) -> pt`. Advances the nonce only on authenticated success.
    pub fn decrypt(&mut self, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let key = self.key.as_ref().ok_or(Error::UninitializedCipher)?;
        if ciphertext.len() < 16 {
            return Err(Error::InvalidCiphertext);
        }
        let next_nonce = self.nonce.checked_add(1).ok_or(Error::SessionExhausted)?;
        let pt = aead_open(key, &aead_nonce(self.nonce), ad, ciphertext)?;
        self.nonce = next_nonce;
        Ok(pt)
    }
}

impl Drop for CipherState {
    fn drop(&mut self) {
        if let Some(k) = self.key.as_mut() {
            k.zeroize();
        }
    }
}
