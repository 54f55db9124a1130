//! Keystore module
//!
//! Abstract keystore API for the node keypair, the mailbox record key and
//! the per-peer shared secret map.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::core_identity::keypair::{Keypair, SharedSecret};
use crate::core_identity::PublicId;
use crate::core_mailbox::RecordKey;

pub mod file_keystore;
pub mod memory_keystore;

pub use file_keystore::FileKeystore;
pub use memory_keystore::MemoryKeystore;

/// Shared secrets indexed by peer identity
pub type SecretMap = BTreeMap<PublicId, SharedSecret>;

/// Keystore errors
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl KeystoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeystoreError::NotFound(_))
    }
}

impl From<serde_json::Error> for KeystoreError {
    fn from(err: serde_json::Error) -> Self {
        KeystoreError::Serialization(err.to_string())
    }
}

/// Abstract keystore trait
pub trait Keystore: Send + Sync {
    /// Load the node keypair
    fn load_keypair(&self) -> Result<Keypair, KeystoreError>;

    /// Replace the node keypair
    fn save_keypair(&self, kp: &Keypair) -> Result<(), KeystoreError>;

    /// Whether a keypair has been provisioned
    fn has_keypair(&self) -> Result<bool, KeystoreError> {
        match self.load_keypair() {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Load the mailbox record key this node uses
    fn load_record_key(&self) -> Result<RecordKey, KeystoreError>;

    /// Persist the mailbox record key
    fn save_record_key(&self, key: &RecordKey) -> Result<(), KeystoreError>;

    /// Load all shared secrets; empty when none were derived yet
    fn load_secrets(&self) -> Result<SecretMap, KeystoreError>;

    /// Insert or replace the secret shared with `peer`, keeping the others
    fn save_secret(&self, peer: &PublicId, secret: &SharedSecret) -> Result<(), KeystoreError>;

    /// Secret shared with one peer
    fn load_secret(&self, peer: &PublicId) -> Result<SharedSecret, KeystoreError> {
        self.load_secrets()?
            .remove(peer)
            .ok_or_else(|| KeystoreError::NotFound(format!("No shared secret for peer {}", peer)))
    }
}
