//! Channel fixtures
//!
//! `ChannelPair` provisions an agent and a wisdom authority the way the
//! CLI would (distinct keypairs, derived pairwise secret, one shared
//! record) and opens a provider for each over separate connections to one
//! in-memory store.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core_channel::{
    ChannelError, ChannelProvider, ChannelResult, PollConfig, ProviderOptions, RateLimiterConfig,
};
use crate::core_crypto::{AuthKeySource, CryptoSuite, XChaChaSuite};
use crate::core_identity::{Keypair, Keystore, MemoryKeystore, Role};
use crate::core_mailbox::{
    MailboxError, MailboxResult, MailboxStore, MemoryMailbox, RecordHandle, RecordKey,
    RecordSchema, Slot,
};

/// Poll backoffs short enough for tests running in real time
pub fn fast_poll_config() -> PollConfig {
    PollConfig {
        empty_backoff: Duration::from_millis(10),
        rate_limit_backoff: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
    }
}

/// Fails the first `failures` reads with `Disconnected`, then delegates
pub struct FlakyMailbox {
    inner: Arc<dyn MailboxStore>,
    failures_left: AtomicUsize,
    gets: AtomicUsize,
}

impl FlakyMailbox {
    pub fn new(inner: Arc<dyn MailboxStore>, failures: usize) -> Self {
        FlakyMailbox {
            inner,
            failures_left: AtomicUsize::new(failures),
            gets: AtomicUsize::new(0),
        }
    }

    /// Reads attempted, failed ones included
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailboxStore for FlakyMailbox {
    async fn create_record(
        &self,
        schema: RecordSchema,
        owner: &Keypair,
    ) -> MailboxResult<RecordHandle> {
        self.inner.create_record(schema, owner).await
    }

    async fn open_record(
        &self,
        key: &RecordKey,
        writer: Option<&Keypair>,
    ) -> MailboxResult<RecordHandle> {
        self.inner.open_record(key, writer).await
    }

    async fn get(
        &self,
        handle: &RecordHandle,
        slot: Slot,
        force_refresh: bool,
    ) -> MailboxResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MailboxError::Disconnected);
        }
        self.inner.get(handle, slot, force_refresh).await
    }

    async fn set(&self, handle: &RecordHandle, slot: Slot, value: &[u8]) -> MailboxResult<()> {
        self.inner.set(handle, slot, value).await
    }

    async fn close(&self, handle: RecordHandle) -> MailboxResult<()> {
        self.inner.close(handle).await
    }

    async fn close_connection(&self) -> MailboxResult<()> {
        self.inner.close_connection().await
    }
}

#[derive(Debug, Clone)]
pub struct PairConfig {
    pub rate_limit: RateLimiterConfig,
    pub poll: PollConfig,
    /// Reads the wisdom authority's connection fails before working
    pub wa_get_failures: usize,
}

impl Default for PairConfig {
    fn default() -> Self {
        PairConfig {
            // 10ms backoffs would exhaust the production limit in under a second
            rate_limit: RateLimiterConfig {
                max_per_window: 100_000,
                window: Duration::from_secs(60),
            },
            poll: fast_poll_config(),
            wa_get_failures: 0,
        }
    }
}

pub struct ChannelPair {
    /// The shared store; connections made from it see the same records
    pub store: Arc<MemoryMailbox>,
    pub record_key: RecordKey,
    pub agent_keypair: Keypair,
    pub wa_keypair: Keypair,
    pub agent: ChannelProvider,
    pub wa: ChannelProvider,
    pub wa_mailbox: Option<Arc<FlakyMailbox>>,
}

impl ChannelPair {
    pub async fn new() -> ChannelResult<Self> {
        Self::build(PairConfig::default()).await
    }

    pub async fn build(config: PairConfig) -> ChannelResult<Self> {
        let suite = XChaChaSuite::new();
        let agent_keypair = suite.generate_keypair();
        let wa_keypair = suite.generate_keypair();

        let agent_keystore = MemoryKeystore::with_keypair(agent_keypair.clone());
        let wa_keystore = MemoryKeystore::with_keypair(wa_keypair.clone());

        let secret = suite.key_agreement(agent_keypair.secret(), wa_keypair.public_id())?;
        agent_keystore.save_secret(wa_keypair.public_id(), &secret)?;
        let secret = suite.key_agreement(wa_keypair.secret(), agent_keypair.public_id())?;
        wa_keystore.save_secret(agent_keypair.public_id(), &secret)?;

        let store = Arc::new(MemoryMailbox::new());
        let schema = RecordSchema::two_party(*agent_keypair.public_id(), *wa_keypair.public_id());
        let handle = store
            .create_record(schema, &wa_keypair)
            .await
            .map_err(ChannelError::Connection)?;
        let record_key = *handle.key();
        store.close(handle).await.map_err(ChannelError::Connection)?;

        let options = |role: Role, peer: &Keypair| {
            ProviderOptions::new(role)
                .with_record_key(record_key)
                .with_peer(*peer.public_id())
                .with_auth_key(AuthKeySource::PeerSecret)
                .with_rate_limit(config.rate_limit.clone())
                .with_poll(config.poll.clone())
        };

        let agent = ChannelProvider::open(
            options(Role::Agent, &wa_keypair),
            &agent_keystore,
            Arc::new(store.connect()),
        )
        .await?;

        let mut wa_store: Arc<dyn MailboxStore> = Arc::new(store.connect());
        let mut wa_mailbox = None;
        if config.wa_get_failures > 0 {
            let flaky = Arc::new(FlakyMailbox::new(wa_store, config.wa_get_failures));
            wa_store = flaky.clone();
            wa_mailbox = Some(flaky);
        }
        let wa = ChannelProvider::open(
            options(Role::WisdomAuthority, &agent_keypair),
            &wa_keystore,
            wa_store,
        )
        .await?;

        Ok(ChannelPair {
            store,
            record_key,
            agent_keypair,
            wa_keypair,
            agent,
            wa,
            wa_mailbox,
        })
    }

    /// Stop both providers
    pub async fn shutdown(mut self) {
        self.agent.stop().await;
        self.wa.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_channel::InboundValue;
    use crate::core_envelope::Operation;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_exchanges_messages() {
        let pair = ChannelPair::new().await.unwrap();

        pair.agent.send(Operation::Speak, json!({"text": "hi"})).await.unwrap();
        match pair.wa.receive_once().await.unwrap() {
            InboundValue::Message(envelope) => {
                assert_eq!(envelope.op(), &Operation::Speak);
                assert_eq!(envelope.body(), &json!({"text": "hi"}));
            }
            other => panic!("expected message, got {:?}", other),
        }

        // the agent's own inbound slot is still empty
        assert_eq!(pair.agent.receive_once().await.unwrap(), InboundValue::Empty);
        pair.shutdown().await;
    }

    #[tokio::test]
    async fn test_flaky_mailbox_recovers() {
        let store = Arc::new(MemoryMailbox::new());
        let owner = Keypair::generate();
        let handle = store
            .create_record(RecordSchema::shared(*owner.public_id()), &owner)
            .await
            .unwrap();

        let flaky = FlakyMailbox::new(store.clone(), 2);
        assert!(flaky.get(&handle, Slot::AGENT_TO_WA, true).await.is_err());
        assert!(flaky.get(&handle, Slot::AGENT_TO_WA, true).await.is_err());
        assert_eq!(flaky.get(&handle, Slot::AGENT_TO_WA, true).await.unwrap(), None);
        assert_eq!(flaky.gets(), 3);
    }
}
