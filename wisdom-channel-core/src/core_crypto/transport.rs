//! Slot wire framing
//!
//! A slot value is `nonce || ciphertext`. The nonce width is fixed on the
//! wire, so a suite with a different nonce length is refused at
//! construction rather than producing values the peer cannot split.

use std::sync::Arc;

use super::{CryptoError, CryptoResult, CryptoSuite};

/// Nonce bytes at the start of every slot value
pub const WIRE_NONCE_LEN: usize = 24;

#[derive(Clone)]
pub struct Transport {
    suite: Arc<dyn CryptoSuite>,
}

impl Transport {
    pub fn new(suite: Arc<dyn CryptoSuite>) -> CryptoResult<Self> {
        if suite.nonce_len() != WIRE_NONCE_LEN {
            return Err(CryptoError::NonceLength {
                expected: WIRE_NONCE_LEN,
                actual: suite.nonce_len(),
            });
        }
        Ok(Transport { suite })
    }

    pub fn suite(&self) -> &dyn CryptoSuite {
        self.suite.as_ref()
    }

    /// Encrypt under a fresh nonce, returning `(nonce, ciphertext)`
    pub fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
        let nonce = self.suite.random_nonce();
        let ciphertext = self.suite.encrypt(key, &nonce, plaintext)?;
        Ok((nonce, ciphertext))
    }

    pub fn decrypt(&self, nonce: &[u8], ciphertext: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
        self.suite.decrypt(key, nonce, ciphertext)
    }

    /// Encrypt and frame as a slot value
    pub fn seal_to_wire(&self, plaintext: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
        let (nonce, ciphertext) = self.encrypt(plaintext, key)?;
        let mut wire = Vec::with_capacity(nonce.len() + ciphertext.len());
        wire.extend_from_slice(&nonce);
        wire.extend_from_slice(&ciphertext);
        Ok(wire)
    }

    /// Split a slot value and decrypt it
    pub fn open_wire(&self, wire: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
        let min = WIRE_NONCE_LEN + self.suite.tag_len();
        if wire.len() < min {
            return Err(CryptoError::Truncated { len: wire.len(), min });
        }
        let (nonce, ciphertext) = wire.split_at(WIRE_NONCE_LEN);
        self.decrypt(nonce, ciphertext, key)
    }
}
