//! File-based keystore
//!
//! Layout under the state directory:
//! ```text
//! keypair.json   {"public_id": "...", "secret": "..."}
//! record.json    {"record_key": "..."}
//! secrets.json   {"<peer public id>": "<base64 shared secret>", ...}
//! ```
//!
//! Every write goes through a temp file followed by a rename, so readers
//! see either the old or the new document. Updates to the secret map are
//! serialized within one process; two processes updating the map at the
//! same time can still lose one of the updates.

use super::{Keystore, KeystoreError, SecretMap};
use crate::core_identity::keypair::{Keypair, SharedSecret};
use crate::core_identity::PublicId;
use crate::core_mailbox::RecordKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const KEYPAIR_FILE: &str = "keypair.json";
const RECORD_FILE: &str = "record.json";
const SECRETS_FILE: &str = "secrets.json";

#[derive(Serialize, Deserialize)]
struct RecordDescriptor {
    record_key: RecordKey,
}

/// File-based keystore rooted at a node's state directory
pub struct FileKeystore {
    base_path: PathBuf,
    secrets_lock: Mutex<()>,
}

impl FileKeystore {
    /// Create a new file keystore at the given path
    pub fn new(base_path: PathBuf) -> Result<Self, KeystoreError> {
        fs::create_dir_all(&base_path)?;

        Ok(FileKeystore {
            base_path,
            secrets_lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn keypair_path(&self) -> PathBuf {
        self.base_path.join(KEYPAIR_FILE)
    }

    fn record_path(&self) -> PathBuf {
        self.base_path.join(RECORD_FILE)
    }

    fn secrets_path(&self) -> PathBuf {
        self.base_path.join(SECRETS_FILE)
    }

    /// Read a file, mapping a missing file to `NotFound`
    fn read(&self, path: &Path, what: &str) -> Result<Vec<u8>, KeystoreError> {
        match fs::read(path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(KeystoreError::NotFound(format!(
                "{} not found at {}",
                what,
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Write file atomically (write to temp, then rename)
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), KeystoreError> {
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, data)?;
        restrict_permissions(&temp_path)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), KeystoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), KeystoreError> {
    Ok(())
}

impl Keystore for FileKeystore {
    fn load_keypair(&self) -> Result<Keypair, KeystoreError> {
        let data = self.read(&self.keypair_path(), "Keypair")?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn save_keypair(&self, kp: &Keypair) -> Result<(), KeystoreError> {
        let data = serde_json::to_vec_pretty(kp)?;
        self.write_atomic(&self.keypair_path(), &data)
    }

    fn load_record_key(&self) -> Result<RecordKey, KeystoreError> {
        let data = self.read(&self.record_path(), "Mailbox record")?;
        let descriptor: RecordDescriptor = serde_json::from_slice(&data)?;
        Ok(descriptor.record_key)
    }

    fn save_record_key(&self, key: &RecordKey) -> Result<(), KeystoreError> {
        let data = serde_json::to_vec_pretty(&RecordDescriptor { record_key: *key })?;
        self.write_atomic(&self.record_path(), &data)
    }

    fn load_secrets(&self) -> Result<SecretMap, KeystoreError> {
        match self.read(&self.secrets_path(), "Secret map") {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.is_not_found() => Ok(SecretMap::new()),
            Err(e) => Err(e),
        }
    }

    fn save_secret(&self, peer: &PublicId, secret: &SharedSecret) -> Result<(), KeystoreError> {
        let _guard = self
            .secrets_lock
            .lock()
            .map_err(|_| KeystoreError::Other("Secret map lock poisoned".to_string()))?;

        let mut secrets = self.load_secrets()?;
        secrets.insert(*peer, secret.clone());
        let data = serde_json::to_vec_pretty(&secrets)?;
        self.write_atomic(&self.secrets_path(), &data)
    }
}
