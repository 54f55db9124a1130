//! In-memory keystore for testing

use super::{Keystore, KeystoreError, SecretMap};
use crate::core_identity::keypair::{Keypair, SharedSecret};
use crate::core_identity::PublicId;
use crate::core_mailbox::RecordKey;
use std::sync::{Arc, PoisonError, RwLock};

/// Helper to convert poison errors into KeystoreError
fn handle_poison<T>(_err: PoisonError<T>) -> KeystoreError {
    KeystoreError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// In-memory keystore (non-persistent, for tests)
#[derive(Clone, Default)]
pub struct MemoryKeystore {
    keypair: Arc<RwLock<Option<Keypair>>>,
    record_key: Arc<RwLock<Option<RecordKey>>>,
    secrets: Arc<RwLock<SecretMap>>,
}

impl MemoryKeystore {
    /// Create a new memory keystore
    pub fn new() -> Self {
        Self::default()
    }

    /// Keystore pre-loaded with a keypair
    pub fn with_keypair(kp: Keypair) -> Self {
        let keystore = Self::new();
        if let Ok(mut slot) = keystore.keypair.write() {
            *slot = Some(kp);
        }
        keystore
    }
}

impl Keystore for MemoryKeystore {
    fn load_keypair(&self) -> Result<Keypair, KeystoreError> {
        self.keypair
            .read()
            .map_err(handle_poison)?
            .clone()
            .ok_or_else(|| KeystoreError::NotFound("Keypair not found".to_string()))
    }

    fn save_keypair(&self, kp: &Keypair) -> Result<(), KeystoreError> {
        *self.keypair.write().map_err(handle_poison)? = Some(kp.clone());
        Ok(())
    }

    fn load_record_key(&self) -> Result<RecordKey, KeystoreError> {
        self.record_key
            .read()
            .map_err(handle_poison)?
            .ok_or_else(|| KeystoreError::NotFound("Mailbox record not found".to_string()))
    }

    fn save_record_key(&self, key: &RecordKey) -> Result<(), KeystoreError> {
        *self.record_key.write().map_err(handle_poison)? = Some(*key);
        Ok(())
    }

    fn load_secrets(&self) -> Result<SecretMap, KeystoreError> {
        Ok(self.secrets.read().map_err(handle_poison)?.clone())
    }

    fn save_secret(&self, peer: &PublicId, secret: &SharedSecret) -> Result<(), KeystoreError> {
        self.secrets
            .write()
            .map_err(handle_poison)?
            .insert(*peer, secret.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_keystore_roundtrip() {
        let keystore = MemoryKeystore::new();
        assert!(!keystore.has_keypair().unwrap());

        let kp = Keypair::generate();
        keystore.save_keypair(&kp).unwrap();

        let loaded = keystore.load_keypair().unwrap();
        assert_eq!(kp.public_id(), loaded.public_id());
    }

    #[test]
    fn test_memory_keystore_secrets() {
        let keystore = MemoryKeystore::with_keypair(Keypair::generate());
        let peer = *Keypair::generate().public_id();

        assert!(keystore.load_secret(&peer).unwrap_err().is_not_found());
        keystore.save_secret(&peer, &SharedSecret::from_bytes([5u8; 32])).unwrap();
        assert_eq!(keystore.load_secret(&peer).unwrap().as_bytes(), &[5u8; 32]);
    }

    #[test]
    fn test_clones_share_state() {
        let keystore = MemoryKeystore::new();
        let other = keystore.clone();
        let key = RecordKey::generate();
        keystore.save_record_key(&key).unwrap();
        assert_eq!(other.load_record_key().unwrap(), key);
    }
}
