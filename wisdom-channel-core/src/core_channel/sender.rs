use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::SendError;
use super::session::ChannelSession;
use crate::core_envelope::Operation;
use crate::core_mailbox::RecordKey;
use crate::metrics;

/// Publishes envelopes to this role's outbound slot
///
/// Cheap to clone; clones share the session and may send concurrently
/// with the worker. There is no retry, and a second send before the peer
/// polls replaces the first.
#[derive(Clone)]
pub struct OutboundSender {
    session: Arc<ChannelSession>,
}

impl OutboundSender {
    pub fn new(session: Arc<ChannelSession>) -> Self {
        OutboundSender { session }
    }

    /// Send on the session's own record, returning the envelope id
    pub async fn send(&self, op: Operation, body: Value) -> Result<String, SendError> {
        let target = *self.session.handle().key();
        self.send_to(&target, op, body).await
    }

    /// Send on `target`, opening it for the call if it is not the
    /// session's record
    pub async fn send_to(
        &self,
        target: &RecordKey,
        op: Operation,
        body: Value,
    ) -> Result<String, SendError> {
        let result = self.publish(target, op.clone(), body).await;
        match &result {
            Ok(id) => {
                self.session.stats().inc_sent(op.as_str());
                debug!(id = %id, op = %op, record = %target, "message published");
            }
            Err(e) => {
                metrics::send_failed();
                warn!(op = %op, record = %target, error = %e, "send failed");
            }
        }
        result
    }

    async fn publish(
        &self,
        target: &RecordKey,
        op: Operation,
        body: Value,
    ) -> Result<String, SendError> {
        let (id, wire) = self.session.seal(op, body)?;
        let slot = self.session.role().outbound_slot();
        let mailbox = self.session.mailbox();

        if target == self.session.handle().key() {
            mailbox.set(self.session.handle(), slot, &wire).await?;
            return Ok(id);
        }

        let handle = mailbox
            .open_record(target, Some(self.session.keypair()))
            .await?;
        let result = mailbox.set(&handle, slot, &wire).await;
        if let Err(e) = mailbox.close(handle).await {
            warn!(record = %target, error = %e, "failed to close record handle");
        }
        result?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_channel::InboundValue;
    use crate::core_mailbox::{MailboxStore, RecordSchema, Slot};
    use crate::test_utils::ChannelPair;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_to_other_record() {
        let pair = ChannelPair::new().await.unwrap();
        let schema = RecordSchema::two_party(
            *pair.agent_keypair.public_id(),
            *pair.wa_keypair.public_id(),
        );
        let conn = pair.store.connect();
        let other = conn.create_record(schema, &pair.wa_keypair).await.unwrap();

        let sender = pair.agent.sender();
        sender
            .send_to(other.key(), Operation::Speak, json!({"to": "other"}))
            .await
            .unwrap();

        assert!(conn.get(&other, Slot::AGENT_TO_WA, true).await.unwrap().is_some());
        assert_eq!(pair.wa.receive_once().await.unwrap(), InboundValue::Empty);
        pair.shutdown().await;
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let pair = ChannelPair::new().await.unwrap();
        let sender = pair.agent.sender();
        sender.send(Operation::Speak, json!({"n": 1})).await.unwrap();
        let second = sender.send(Operation::Speak, json!({"n": 2})).await.unwrap();

        match pair.wa.receive_once().await.unwrap() {
            InboundValue::Message(envelope) => {
                assert_eq!(envelope.id(), second);
                assert_eq!(envelope.body(), &json!({"n": 2}));
            }
            other => panic!("expected message, got {:?}", other),
        }
        assert_eq!(pair.agent.stats().sent, 2);
        pair.shutdown().await;
    }
}
