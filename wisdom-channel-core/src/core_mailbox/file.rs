//! Directory-backed mailbox
//!
//! ```text
//! <root>/<record key>/schema.json
//! <root>/<record key>/slot-<n>.bin
//! ```
//!
//! Slot writes go to a uniquely named temp file that is then renamed over
//! the slot file, so a concurrent reader in another process sees either
//! the previous or the new value, never a partial one.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tracing::debug;

use super::{
    check_value_len, MailboxError, MailboxResult, MailboxStore, RecordHandle, RecordKey,
    RecordSchema, Slot,
};
use crate::core_identity::Keypair;

const SCHEMA_FILE: &str = "schema.json";

pub struct FileMailbox {
    root: PathBuf,
    connected: AtomicBool,
}

impl FileMailbox {
    pub async fn open(root: impl Into<PathBuf>) -> MailboxResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(FileMailbox {
            root,
            connected: AtomicBool::new(true),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_dir(&self, key: &RecordKey) -> PathBuf {
        self.root.join(key.to_string())
    }

    fn slot_path(&self, key: &RecordKey, slot: Slot) -> PathBuf {
        self.record_dir(key).join(format!("slot-{}.bin", slot.index()))
    }

    fn ensure_connected(&self) -> MailboxResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MailboxError::Disconnected)
        }
    }

    async fn load_schema(&self, key: &RecordKey) -> MailboxResult<RecordSchema> {
        let path = self.record_dir(key).join(SCHEMA_FILE);
        match fs::read(&path).await {
            Ok(data) => {
                let schema: RecordSchema = serde_json::from_slice(&data)
                    .map_err(|e| MailboxError::Serialization(e.to_string()))?;
                schema.validate()?;
                Ok(schema)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(MailboxError::RecordNotFound(*key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> MailboxResult<()> {
        let temp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        fs::write(&temp_path, data).await?;
        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl MailboxStore for FileMailbox {
    async fn create_record(
        &self,
        schema: RecordSchema,
        owner: &Keypair,
    ) -> MailboxResult<RecordHandle> {
        self.ensure_connected()?;
        schema.validate()?;
        if !schema.is_member(owner.public_id()) {
            return Err(MailboxError::InvalidSchema(
                "record owner is not a schema member".to_string(),
            ));
        }

        let key = RecordKey::generate();
        let dir = self.record_dir(&key);
        fs::create_dir_all(&dir).await?;
        let data = serde_json::to_vec_pretty(&schema)
            .map_err(|e| MailboxError::Serialization(e.to_string()))?;
        self.write_atomic(&dir.join(SCHEMA_FILE), &data).await?;

        debug!(record = %key, dir = %dir.display(), "created file-backed record");
        Ok(RecordHandle::new(key, Some(*owner.public_id())))
    }

    async fn open_record(
        &self,
        key: &RecordKey,
        writer: Option<&Keypair>,
    ) -> MailboxResult<RecordHandle> {
        self.ensure_connected()?;
        self.load_schema(key).await?;
        Ok(RecordHandle::new(*key, writer.map(|kp| *kp.public_id())))
    }

    async fn get(
        &self,
        handle: &RecordHandle,
        slot: Slot,
        _force_refresh: bool,
    ) -> MailboxResult<Option<Vec<u8>>> {
        self.ensure_connected()?;
        self.load_schema(handle.key()).await?.check_read(slot)?;
        match fs::read(self.slot_path(handle.key(), slot)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, handle: &RecordHandle, slot: Slot, value: &[u8]) -> MailboxResult<()> {
        self.ensure_connected()?;
        check_value_len(value)?;
        self.load_schema(handle.key())
            .await?
            .check_write(slot, handle.writer())?;
        self.write_atomic(&self.slot_path(handle.key(), slot), value).await
    }

    async fn close(&self, _handle: RecordHandle) -> MailboxResult<()> {
        Ok(())
    }

    async fn close_connection(&self) -> MailboxResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
