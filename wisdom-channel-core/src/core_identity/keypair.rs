//! Keypair module
//!
//! X25519 key material for a node, plus the symmetric shared secrets
//! derived from it. Secret bytes are zeroized on drop and never appear in
//! `Debug` output. On disk, secrets are standard base64 strings.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{IdentityError, PublicId};

/// Length of secret keys and shared secrets in bytes
pub const SECRET_LEN: usize = 32;

fn decode_secret(text: &str) -> Result<[u8; SECRET_LEN], IdentityError> {
    let bytes = Zeroizing::new(
        STANDARD
            .decode(text.trim())
            .map_err(|e| IdentityError::InvalidSecret(e.to_string()))?,
    );
    if bytes.len() != SECRET_LEN {
        return Err(IdentityError::InvalidSecret(format!(
            "expected {} bytes, got {}",
            SECRET_LEN,
            bytes.len()
        )));
    }
    let mut out = [0u8; SECRET_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// X25519 static secret
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        SecretKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// Public identity belonging to this secret
    pub fn public_id(&self) -> PublicId {
        let secret = StaticSecret::from(self.0);
        PublicId::from_bytes(X25519PublicKey::from(&secret).to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

impl Serialize for SecretKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(STANDARD.encode(self.0));
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Zeroizing::new(String::deserialize(deserializer)?);
        decode_secret(&text).map(SecretKey).map_err(de::Error::custom)
    }
}

/// Serialized shape of a keypair
#[derive(Serialize, Deserialize)]
struct KeypairRecord {
    public_id: PublicId,
    secret: SecretKey,
}

/// A node's X25519 keypair
///
/// Loading a keypair whose stored public id does not match its secret
/// fails, so a hand-edited keystore cannot silently impersonate another
/// node.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "KeypairRecord", into = "KeypairRecord")]
pub struct Keypair {
    public_id: PublicId,
    secret: SecretKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; SECRET_LEN]);
        rand::rng().fill_bytes(&mut bytes[..]);
        Self::from_secret(SecretKey::from_bytes(*bytes))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        Keypair {
            public_id: secret.public_id(),
            secret,
        }
    }

    pub fn public_id(&self) -> &PublicId {
        &self.public_id
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl TryFrom<KeypairRecord> for Keypair {
    type Error = IdentityError;

    fn try_from(record: KeypairRecord) -> Result<Self, Self::Error> {
        let keypair = Keypair::from_secret(record.secret);
        if keypair.public_id != record.public_id {
            return Err(IdentityError::KeyMismatch);
        }
        Ok(keypair)
    }
}

impl From<Keypair> for KeypairRecord {
    fn from(keypair: Keypair) -> Self {
        KeypairRecord {
            public_id: keypair.public_id,
            secret: keypair.secret,
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_id", &self.public_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Symmetric secret shared between two nodes
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SECRET_LEN]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        SharedSecret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

impl Serialize for SharedSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(STANDARD.encode(self.0));
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for SharedSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Zeroizing::new(String::deserialize(deserializer)?);
        decode_secret(&text).map(SharedSecret).map_err(de::Error::custom)
    }
}
