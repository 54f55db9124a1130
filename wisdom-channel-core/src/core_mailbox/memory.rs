//! In-memory mailbox
//!
//! Records live in a backing map shared between connections. Each
//! `connect()` yields an independent connection, so two providers in one
//! process can exchange messages and close their own connection without
//! affecting the other.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::{
    check_value_len, MailboxError, MailboxResult, MailboxStore, RecordHandle, RecordKey,
    RecordSchema, Slot,
};
use crate::core_identity::Keypair;

fn handle_poison<T>(_err: PoisonError<T>) -> MailboxError {
    MailboxError::Internal("Lock poisoned: a task panicked while holding the lock".to_string())
}

struct StoredRecord {
    schema: RecordSchema,
    slots: Vec<Option<Vec<u8>>>,
}

type Records = Arc<RwLock<HashMap<RecordKey, StoredRecord>>>;

/// One connection to an in-memory record store
pub struct MemoryMailbox {
    records: Records,
    connected: AtomicBool,
    open_handles: AtomicUsize,
}

impl MemoryMailbox {
    /// Create an empty store and return the first connection to it
    pub fn new() -> Self {
        Self::with_records(Arc::new(RwLock::new(HashMap::new())))
    }

    fn with_records(records: Records) -> Self {
        MemoryMailbox {
            records,
            connected: AtomicBool::new(true),
            open_handles: AtomicUsize::new(0),
        }
    }

    /// Another connection to the same records
    pub fn connect(&self) -> Self {
        Self::with_records(self.records.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Handles opened on this connection and not yet closed
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> MailboxResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MailboxError::Disconnected)
        }
    }
}

impl Default for MemoryMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailboxStore for MemoryMailbox {
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
        let slots = vec![None; schema.slot_count() as usize];
        self.records
            .write()
            .map_err(handle_poison)?
            .insert(key, StoredRecord { schema, slots });
        self.open_handles.fetch_add(1, Ordering::SeqCst);

        debug!(record = %key, "created in-memory record");
        Ok(RecordHandle::new(key, Some(*owner.public_id())))
    }

    async fn open_record(
        &self,
        key: &RecordKey,
        writer: Option<&Keypair>,
    ) -> MailboxResult<RecordHandle> {
        self.ensure_connected()?;
        if !self.records.read().map_err(handle_poison)?.contains_key(key) {
            return Err(MailboxError::RecordNotFound(*key));
        }
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(RecordHandle::new(*key, writer.map(|kp| *kp.public_id())))
    }

    async fn get(
        &self,
        handle: &RecordHandle,
        slot: Slot,
        _force_refresh: bool,
    ) -> MailboxResult<Option<Vec<u8>>> {
        self.ensure_connected()?;
        let records = self.records.read().map_err(handle_poison)?;
        let record = records
            .get(handle.key())
            .ok_or(MailboxError::RecordNotFound(*handle.key()))?;
        record.schema.check_read(slot)?;
        Ok(record.slots[slot.index() as usize].clone())
    }

    async fn set(&self, handle: &RecordHandle, slot: Slot, value: &[u8]) -> MailboxResult<()> {
        self.ensure_connected()?;
        check_value_len(value)?;
        let mut records = self.records.write().map_err(handle_poison)?;
        let record = records
            .get_mut(handle.key())
            .ok_or(MailboxError::RecordNotFound(*handle.key()))?;
        record.schema.check_write(slot, handle.writer())?;
        record.slots[slot.index() as usize] = Some(value.to_vec());
        Ok(())
    }

    async fn close(&self, _handle: RecordHandle) -> MailboxResult<()> {
        let _ = self
            .open_handles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        Ok(())
    }

    async fn close_connection(&self) -> MailboxResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
