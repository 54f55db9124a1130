//! Shared channel state
//!
//! One `ChannelSession` is built per provider and shared by the inbound
//! worker and any number of senders. It owns the keypair, the derived
//! channel keys, the open record handle and the inbound limiter.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{DropReason, SendError};
use super::rate_limiter::SlidingWindowLimiter;
use crate::core_crypto::{ChannelKeys, CryptoError, Transport};
use crate::core_envelope::{self, Envelope, EnvelopeError, Operation};
use crate::core_identity::{Keypair, PublicId, Role};
use crate::core_mailbox::{MailboxError, MailboxStore, RecordHandle, MAX_VALUE_LEN};
use crate::metrics::ChannelStats;

/// Result of reading the inbound slot without dispatching
#[derive(Debug, Clone, PartialEq)]
pub enum InboundValue {
    Empty,
    Message(Envelope),
    Dropped(DropReason),
}

pub struct ChannelSession {
    role: Role,
    keypair: Keypair,
    peer: Option<PublicId>,
    keys: ChannelKeys,
    transport: Transport,
    mailbox: Arc<dyn MailboxStore>,
    handle: RecordHandle,
    limiter: Mutex<SlidingWindowLimiter>,
    stats: ChannelStats,
}

impl ChannelSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        role: Role,
        keypair: Keypair,
        peer: Option<PublicId>,
        keys: ChannelKeys,
        transport: Transport,
        mailbox: Arc<dyn MailboxStore>,
        handle: RecordHandle,
        limiter: SlidingWindowLimiter,
    ) -> Self {
        ChannelSession {
            role,
            keypair,
            peer,
            keys,
            transport,
            mailbox,
            handle,
            limiter: Mutex::new(limiter),
            stats: ChannelStats::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn public_id(&self) -> &PublicId {
        self.keypair.public_id()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn peer(&self) -> Option<&PublicId> {
        self.peer.as_ref()
    }

    pub fn handle(&self) -> &RecordHandle {
        &self.handle
    }

    pub fn mailbox(&self) -> &Arc<dyn MailboxStore> {
        &self.mailbox
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Ask the limiter whether a poll may touch the mailbox now
    pub(crate) async fn admit_poll(&self) -> bool {
        let now = tokio::time::Instant::now().into_std();
        self.limiter.lock().await.allow(now)
    }

    /// Raw bytes of the slot this role polls
    pub async fn fetch_inbound(&self) -> Result<Option<Vec<u8>>, MailboxError> {
        self.mailbox
            .get(&self.handle, self.role.inbound_slot(), true)
            .await
    }

    /// Decrypt and verify one slot value
    pub fn open_value(&self, wire: &[u8]) -> Result<Envelope, DropReason> {
        let plaintext = self
            .transport
            .open_wire(wire, self.keys.transport_key())
            .map_err(|e| match e {
                CryptoError::Truncated { .. } => DropReason::Truncated,
                _ => DropReason::Decryption,
            })?;

        core_envelope::decode_and_verify(&plaintext, self.keys.tag_key()).map_err(|e| match e {
            EnvelopeError::Integrity => DropReason::Integrity,
            _ => DropReason::Malformed,
        })
    }

    /// Read the inbound slot once and verify what is there
    pub async fn read_inbound(&self) -> Result<InboundValue, MailboxError> {
        Ok(match self.fetch_inbound().await? {
            None => InboundValue::Empty,
            Some(wire) => match self.open_value(&wire) {
                Ok(envelope) => InboundValue::Message(envelope),
                Err(reason) => InboundValue::Dropped(reason),
            },
        })
    }

    /// Build, tag and encrypt a message, returning its id and slot value
    pub fn seal(&self, op: Operation, body: Value) -> Result<(String, Vec<u8>), SendError> {
        if !op.is_known() {
            return Err(SendError::UnknownOperation(op));
        }
        if op.sender_role() != Some(self.role) {
            return Err(SendError::WrongDirection { role: self.role, op });
        }

        let envelope = core_envelope::encode(op, body, self.keys.tag_key())?;
        let plaintext = envelope.to_wire()?;
        let wire = self
            .transport
            .seal_to_wire(&plaintext, self.keys.transport_key())?;

        if wire.len() > MAX_VALUE_LEN {
            return Err(SendError::PayloadTooLarge { len: wire.len(), max: MAX_VALUE_LEN });
        }

        debug!(id = %envelope.id(), op = %envelope.op(), bytes = wire.len(), "sealed envelope");
        Ok((envelope.id().to_string(), wire))
    }
}
