//! Mailbox record addressing
//!
//! A record is a small set of independently writable slots. Slots are
//! handed out to schema members in order: member 0 owns the first
//! `slot_count` slots, member 1 the next ones, and so on.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::MailboxError;
use crate::core_identity::PublicId;

/// Length of a record key in bytes
pub const RECORD_KEY_LEN: usize = 32;

/// Address of a mailbox record
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey([u8; RECORD_KEY_LEN]);

impl RecordKey {
    /// Fresh random record key
    pub fn generate() -> Self {
        let mut bytes = [0u8; RECORD_KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        RecordKey(bytes)
    }

    pub fn from_bytes(bytes: [u8; RECORD_KEY_LEN]) -> Self {
        RecordKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; RECORD_KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({})", self)
    }
}

impl FromStr for RecordKey {
    type Err = MailboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| MailboxError::InvalidRecordKey(e.to_string()))?;
        let arr: [u8; RECORD_KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            MailboxError::InvalidRecordKey(format!(
                "expected {} bytes, got {}",
                RECORD_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(RecordKey(arr))
    }
}

impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Index of a slot within a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u32);

impl Slot {
    /// Written by the agent, polled by the wisdom authority
    pub const AGENT_TO_WA: Slot = Slot(0);
    /// Written by the wisdom authority, polled by the agent
    pub const WA_TO_AGENT: Slot = Slot(1);

    pub const fn new(index: u32) -> Self {
        Slot(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMember {
    pub public_id: PublicId,
    pub slot_count: u32,
}

/// Who may write which slot of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub members: Vec<SchemaMember>,
}

impl RecordSchema {
    /// The channel layout: agent owns slot 0, wisdom authority owns slot 1
    pub fn two_party(agent: PublicId, wa: PublicId) -> Self {
        RecordSchema {
            members: vec![
                SchemaMember { public_id: agent, slot_count: 1 },
                SchemaMember { public_id: wa, slot_count: 1 },
            ],
        }
    }

    /// Both channel slots owned by one identity, for nodes sharing a keypair
    pub fn shared(owner: PublicId) -> Self {
        RecordSchema {
            members: vec![SchemaMember { public_id: owner, slot_count: 2 }],
        }
    }

    pub fn validate(&self) -> Result<(), MailboxError> {
        if self.members.is_empty() {
            return Err(MailboxError::InvalidSchema("schema has no members".to_string()));
        }
        for (i, member) in self.members.iter().enumerate() {
            if member.slot_count == 0 {
                return Err(MailboxError::InvalidSchema(format!(
                    "member {} owns no slots",
                    member.public_id
                )));
            }
            if self.members[..i].iter().any(|m| m.public_id == member.public_id) {
                return Err(MailboxError::InvalidSchema(format!(
                    "member {} listed twice",
                    member.public_id
                )));
            }
        }
        if self.total_slots().is_none() {
            return Err(MailboxError::InvalidSchema(
                "member slot counts overflow".to_string(),
            ));
        }
        Ok(())
    }

    fn total_slots(&self) -> Option<u32> {
        self.members
            .iter()
            .try_fold(0u32, |total, m| total.checked_add(m.slot_count))
    }

    /// Number of slots; saturates for a schema that fails `validate`
    pub fn slot_count(&self) -> u32 {
        self.total_slots().unwrap_or(u32::MAX)
    }

    pub fn is_member(&self, id: &PublicId) -> bool {
        self.members.iter().any(|m| &m.public_id == id)
    }

    /// Member allowed to write `slot`
    pub fn owner_of(&self, slot: Slot) -> Option<&PublicId> {
        let mut offset = slot.0;
        for member in &self.members {
            if offset < member.slot_count {
                return Some(&member.public_id);
            }
            offset -= member.slot_count;
        }
        None
    }

    /// Check that `writer` may store a value in `slot`
    pub fn check_write(&self, slot: Slot, writer: Option<&PublicId>) -> Result<(), MailboxError> {
        let owner = self.owner_of(slot).ok_or(MailboxError::SlotOutOfRange {
            slot,
            count: self.slot_count(),
        })?;
        match writer {
            Some(w) if w == owner => Ok(()),
            _ => Err(MailboxError::WriteDenied { slot }),
        }
    }

    pub fn check_read(&self, slot: Slot) -> Result<(), MailboxError> {
        if slot.0 >= self.slot_count() {
            return Err(MailboxError::SlotOutOfRange { slot, count: self.slot_count() });
        }
        Ok(())
    }
}

/// An open record, optionally carrying the identity allowed to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    key: RecordKey,
    writer: Option<PublicId>,
}

impl RecordHandle {
    pub fn new(key: RecordKey, writer: Option<PublicId>) -> Self {
        RecordHandle { key, writer }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn writer(&self) -> Option<&PublicId> {
        self.writer.as_ref()
    }
}
