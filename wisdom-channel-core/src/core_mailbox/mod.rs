//! Shared key/value mailbox
//!
//! The channel never talks to its peer directly. Both sides open the same
//! record and each writes its own slot; the other side polls it. A slot
//! holds a single value, so a newer write replaces an unread older one.
//!
//! `MailboxStore` is the seam to the storage network. Every call is one
//! atomic request/response, which lets the inbound worker and outbound
//! sender share a single store handle. Two reference implementations are
//! provided: `MemoryMailbox` for tests and in-process pairs, and
//! `FileMailbox` for nodes on one host sharing a directory.

use async_trait::async_trait;
use thiserror::Error;

use crate::core_identity::Keypair;

mod file;
mod memory;
mod record;

pub use file::FileMailbox;
pub use memory::MemoryMailbox;
pub use record::{RecordHandle, RecordKey, RecordSchema, SchemaMember, Slot, RECORD_KEY_LEN};

/// Largest value a slot accepts
pub const MAX_VALUE_LEN: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Mailbox connection is closed")]
    Disconnected,

    #[error("Record not found: {0}")]
    RecordNotFound(RecordKey),

    #[error("Slot {slot} out of range (record has {count} slots)")]
    SlotOutOfRange { slot: Slot, count: u32 },

    #[error("Write to slot {slot} denied")]
    WriteDenied { slot: Slot },

    #[error("Value of {len} bytes exceeds the {max} byte limit")]
    ValueTooLarge { len: usize, max: usize },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid record key: {0}")]
    InvalidRecordKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type MailboxResult<T> = Result<T, MailboxError>;

/// Key/value mailbox operations
#[async_trait]
pub trait MailboxStore: Send + Sync {
    /// Create a new record with `schema`; the handle writes as `owner`
    async fn create_record(
        &self,
        schema: RecordSchema,
        owner: &Keypair,
    ) -> MailboxResult<RecordHandle>;

    /// Open an existing record, optionally as a writer
    async fn open_record(
        &self,
        key: &RecordKey,
        writer: Option<&Keypair>,
    ) -> MailboxResult<RecordHandle>;

    /// Current value of a slot, `None` if it was never written.
    /// `force_refresh` bypasses any local cache.
    async fn get(
        &self,
        handle: &RecordHandle,
        slot: Slot,
        force_refresh: bool,
    ) -> MailboxResult<Option<Vec<u8>>>;

    /// Replace the value of a slot
    async fn set(&self, handle: &RecordHandle, slot: Slot, value: &[u8]) -> MailboxResult<()>;

    /// Release a record handle
    async fn close(&self, handle: RecordHandle) -> MailboxResult<()>;

    /// Shut the connection down; later calls fail with `Disconnected`
    async fn close_connection(&self) -> MailboxResult<()>;
}

fn check_value_len(value: &[u8]) -> MailboxResult<()> {
    if value.len() > MAX_VALUE_LEN {
        return Err(MailboxError::ValueTooLarge { len: value.len(), max: MAX_VALUE_LEN });
    }
    Ok(())
}
