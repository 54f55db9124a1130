//! Crypto provider
//!
//! `CryptoSuite` is the seam between the channel and its primitives. The
//! channel only needs AEAD with explicit nonces, key generation and key
//! agreement; `XChaChaSuite` provides them with XChaCha20-Poly1305 and
//! X25519 followed by HKDF-SHA256.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::aead::generic_array::typenum::Unsigned;
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::{CryptoError, CryptoResult};
use crate::core_identity::{Keypair, PublicId, SecretKey, SharedSecret};

const SHARED_SECRET_INFO: &[u8] = b"wisdom-channel/shared-secret/v1";
const AEAD_KEY_LEN: usize = 32;

pub trait CryptoSuite: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &'static str;

    /// Nonce length the cipher expects
    fn nonce_len(&self) -> usize;

    /// Authentication tag overhead per ciphertext
    fn tag_len(&self) -> usize;

    /// Fresh nonce from a CSPRNG
    fn random_nonce(&self) -> Vec<u8>;

    fn encrypt(&self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    fn decrypt(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;

    fn generate_keypair(&self) -> Keypair;

    /// Derive the secret shared between `secret` and `peer`
    fn key_agreement(&self, secret: &SecretKey, peer: &PublicId) -> CryptoResult<SharedSecret>;
}

/// XChaCha20-Poly1305 + X25519 + HKDF-SHA256
#[derive(Debug, Clone, Copy, Default)]
pub struct XChaChaSuite;

impl XChaChaSuite {
    pub fn new() -> Self {
        XChaChaSuite
    }

    fn cipher(&self, key: &[u8]) -> CryptoResult<XChaCha20Poly1305> {
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
            expected: AEAD_KEY_LEN,
            actual: key.len(),
        })
    }

    fn check_nonce<'a>(&self, nonce: &'a [u8]) -> CryptoResult<&'a XNonce> {
        if nonce.len() != self.nonce_len() {
            return Err(CryptoError::NonceLength {
                expected: self.nonce_len(),
                actual: nonce.len(),
            });
        }
        Ok(XNonce::from_slice(nonce))
    }
}

impl CryptoSuite for XChaChaSuite {
    fn name(&self) -> &'static str {
        "XCHACHA20POLY1305-X25519-HKDF-SHA256"
    }

    fn nonce_len(&self) -> usize {
        <XChaCha20Poly1305 as AeadCore>::NonceSize::USIZE
    }

    fn tag_len(&self) -> usize {
        <XChaCha20Poly1305 as AeadCore>::TagSize::USIZE
    }

    fn random_nonce(&self) -> Vec<u8> {
        XChaCha20Poly1305::generate_nonce(&mut OsRng).to_vec()
    }

    fn encrypt(&self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let nonce = self.check_nonce(nonce)?;
        self.cipher(key)?
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    fn decrypt(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let nonce = self.check_nonce(nonce)?;
        self.cipher(key)?
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }

    fn generate_keypair(&self) -> Keypair {
        Keypair::generate()
    }

    fn key_agreement(&self, secret: &SecretKey, peer: &PublicId) -> CryptoResult<SharedSecret> {
        let local = StaticSecret::from(*secret.as_bytes());
        let remote = X25519PublicKey::from(*peer.as_bytes());
        let dh = local.diffie_hellman(&remote);
        if !dh.was_contributory() {
            return Err(CryptoError::KeyAgreement(
                "peer public key is a low-order point".to_string(),
            ));
        }

        let hk = Hkdf::<Sha256>::new(None, dh.as_bytes());
        let mut okm = [0u8; 32];
        hk.expand(SHARED_SECRET_INFO, &mut okm)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(SharedSecret::from_bytes(okm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_len_is_24() {
        let suite = XChaChaSuite::new();
        assert_eq!(suite.nonce_len(), 24);
        assert_eq!(suite.random_nonce().len(), 24);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let suite = XChaChaSuite::new();
        let key = [3u8; 32];
        let nonce = suite.random_nonce();

        let ct = suite.encrypt(&key, &nonce, b"payload").unwrap();
        assert_eq!(ct.len(), b"payload".len() + suite.tag_len());
        assert_eq!(suite.decrypt(&key, &nonce, &ct).unwrap(), b"payload");
    }

    #[test]
    fn test_wrong_key_fails() {
        let suite = XChaChaSuite::new();
        let nonce = suite.random_nonce();
        let ct = suite.encrypt(&[1u8; 32], &nonce, b"payload").unwrap();
        assert!(matches!(
            suite.decrypt(&[2u8; 32], &nonce, &ct),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn test_bad_key_and_nonce_lengths() {
        let suite = XChaChaSuite::new();
        assert!(matches!(
            suite.encrypt(&[0u8; 16], &suite.random_nonce(), b"x"),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 16 })
        ));
        assert!(matches!(
            suite.encrypt(&[0u8; 32], &[0u8; 12], b"x"),
            Err(CryptoError::NonceLength { expected: 24, actual: 12 })
        ));
    }

    #[test]
    fn test_key_agreement_is_symmetric() {
        let suite = XChaChaSuite::new();
        let alice = suite.generate_keypair();
        let bob = suite.generate_keypair();

        let ab = suite.key_agreement(alice.secret(), bob.public_id()).unwrap();
        let ba = suite.key_agreement(bob.secret(), alice.public_id()).unwrap();
        assert_eq!(ab, ba);

        let carol = suite.generate_keypair();
        let ac = suite.key_agreement(alice.secret(), carol.public_id()).unwrap();
        assert_ne!(ab, ac);
    }

    #[test]
    fn test_low_order_peer_rejected() {
        let suite = XChaChaSuite::new();
        let alice = suite.generate_keypair();
        let zero = PublicId::from_bytes([0u8; 32]);
        assert!(matches!(
            suite.key_agreement(alice.secret(), &zero),
            Err(CryptoError::KeyAgreement(_))
        ));
    }
}
