//! Channel provider
//!
//! `ChannelProvider` is the single session object of a node. `open` loads
//! the keypair and channel key, opens the record and builds the shared
//! session; `start` spawns the inbound worker; `stop` ends it and releases
//! the record and the mailbox connection.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::error::{ChannelError, ChannelResult, SendError};
use super::handlers::OperationHandler;
use super::rate_limiter::{RateLimiterConfig, SlidingWindowLimiter};
use super::sender::OutboundSender;
use super::session::{ChannelSession, InboundValue};
use super::worker::{InboundWorker, PollConfig};
use crate::config::{Config, ConfigError};
use crate::core_crypto::{AuthKeySource, ChannelKeys, CryptoSuite, Transport, XChaChaSuite};
use crate::core_envelope::Operation;
use crate::core_identity::{Keypair, Keystore, PublicId, Role};
use crate::core_mailbox::{MailboxError, MailboxStore, RecordKey};
use crate::metrics::StatsSnapshot;
use crate::provisioning;

/// Everything a provider needs besides the stores
#[derive(Clone)]
pub struct ProviderOptions {
    pub role: Role,
    /// Record to listen on; `None` reads the keystore's record key
    pub record_key: Option<RecordKey>,
    pub peer: Option<PublicId>,
    pub auth_key: AuthKeySource,
    pub rate_limit: RateLimiterConfig,
    pub poll: PollConfig,
    pub suite: Arc<dyn CryptoSuite>,
}

impl ProviderOptions {
    pub fn new(role: Role) -> Self {
        ProviderOptions {
            role,
            record_key: None,
            peer: None,
            auth_key: AuthKeySource::default(),
            rate_limit: RateLimiterConfig::default(),
            poll: PollConfig::default(),
            suite: Arc::new(XChaChaSuite::new()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(ProviderOptions {
            role: config.node.role,
            record_key: config.record_key()?,
            peer: config.peer_key()?,
            auth_key: config.channel.auth_key,
            rate_limit: config.rate_limit.clone(),
            poll: config.poll.clone(),
            suite: Arc::new(XChaChaSuite::new()),
        })
    }

    pub fn with_record_key(mut self, key: RecordKey) -> Self {
        self.record_key = Some(key);
        self
    }

    pub fn with_peer(mut self, peer: PublicId) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_auth_key(mut self, source: AuthKeySource) -> Self {
        self.auth_key = source;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimiterConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_suite(mut self, suite: Arc<dyn CryptoSuite>) -> Self {
        self.suite = suite;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Stopped,
    Running,
}

struct RunningWorker {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ChannelProvider {
    session: Arc<ChannelSession>,
    poll: PollConfig,
    worker: Option<RunningWorker>,
    closed: bool,
}

/// Channel material and the peer it belongs to
fn select_material(
    auth_key: AuthKeySource,
    keypair: &Keypair,
    peer: Option<PublicId>,
    keystore: &dyn Keystore,
) -> ChannelResult<(Zeroizing<[u8; 32]>, Option<PublicId>)> {
    match auth_key {
        AuthKeySource::LocalSecret => {
            warn!(
                public_id = %keypair.public_id(),
                "channel keyed from the local secret; both nodes must hold the same keypair"
            );
            Ok((Zeroizing::new(*keypair.secret().as_bytes()), peer))
        }
        AuthKeySource::PeerSecret => {
            let secrets = keystore.load_secrets()?;
            let peer = match peer {
                Some(peer) => peer,
                None if secrets.len() == 1 => match secrets.keys().next() {
                    Some(only) => *only,
                    None => return Err(ChannelError::AmbiguousPeer(0)),
                },
                None => return Err(ChannelError::AmbiguousPeer(secrets.len())),
            };
            let secret = secrets
                .get(&peer)
                .ok_or(ChannelError::MissingSharedSecret(peer))?;
            Ok((Zeroizing::new(*secret.as_bytes()), Some(peer)))
        }
    }
}

impl ChannelProvider {
    /// Load keys, open the record and build the session. The worker is
    /// not started.
    pub async fn open(
        options: ProviderOptions,
        keystore: &dyn Keystore,
        mailbox: Arc<dyn MailboxStore>,
    ) -> ChannelResult<Self> {
        let keypair = provisioning::load_keypair(keystore)?;
        let record_key = match options.record_key {
            Some(key) => key,
            None => provisioning::load_record_key(keystore)?,
        };

        let (material, peer) =
            select_material(options.auth_key, &keypair, options.peer, keystore)?;
        let keys = ChannelKeys::derive(material.as_slice())?;
        let transport = Transport::new(options.suite.clone())?;

        let handle = mailbox
            .open_record(&record_key, Some(&keypair))
            .await
            .map_err(ChannelError::Connection)?;

        info!(
            role = %options.role,
            public_id = %keypair.public_id(),
            record = %record_key,
            auth_key = %options.auth_key,
            "channel opened"
        );

        let limiter = SlidingWindowLimiter::from_config(&options.rate_limit);
        let session = ChannelSession::new(
            options.role,
            keypair,
            peer,
            keys,
            transport,
            mailbox,
            handle,
            limiter,
        );

        Ok(ChannelProvider {
            session: Arc::new(session),
            poll: options.poll,
            worker: None,
            closed: false,
        })
    }

    pub fn state(&self) -> ProviderState {
        match &self.worker {
            Some(worker) if !worker.task.is_finished() => ProviderState::Running,
            _ => ProviderState::Stopped,
        }
    }

    pub fn role(&self) -> Role {
        self.session.role()
    }

    pub fn public_id(&self) -> &PublicId {
        self.session.public_id()
    }

    pub fn record_key(&self) -> &RecordKey {
        self.session.handle().key()
    }

    pub fn session(&self) -> &Arc<ChannelSession> {
        &self.session
    }

    /// Spawn the inbound worker
    pub fn start(&mut self, handler: Arc<dyn OperationHandler>) -> ChannelResult<()> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        if self.state() == ProviderState::Running {
            return Err(ChannelError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = InboundWorker::new(self.session.clone(), handler, self.poll.clone());
        let task = tokio::spawn(worker.run(stop_rx));
        self.worker = Some(RunningWorker { stop_tx, task });
        Ok(())
    }

    /// Stop the worker after its current iteration, then close the record
    /// and the connection. Calling it again does nothing.
    pub async fn stop(&mut self) {
        self.shutdown(None).await;
    }

    /// Like `stop`, but aborts the worker if it has not finished within
    /// `limit`. The record and the connection are released either way.
    /// Returns false when the worker had to be aborted.
    pub async fn stop_within(&mut self, limit: Duration) -> bool {
        self.shutdown(Some(limit)).await
    }

    // The worker handle stays in place until it is joined, so a caller
    // that drops this future can still finish the job with another call.
    async fn shutdown(&mut self, limit: Option<Duration>) -> bool {
        if self.closed {
            return true;
        }

        let mut drained = true;
        if let Some(worker) = self.worker.as_mut() {
            let _ = worker.stop_tx.send(true);
            let joined = match limit {
                Some(limit) => tokio::time::timeout(limit, &mut worker.task).await.ok(),
                None => Some((&mut worker.task).await),
            };
            match joined {
                Some(Ok(())) => {}
                Some(Err(e)) => warn!(error = %e, "inbound worker ended abnormally"),
                None => {
                    warn!(limit = ?limit, "inbound worker did not stop in time, aborting");
                    worker.task.abort();
                    drained = false;
                }
            }
        }
        self.worker = None;
        self.closed = true;

        let mailbox = self.session.mailbox();
        if let Err(e) = mailbox.close(self.session.handle().clone()).await {
            warn!(error = %e, "failed to close record");
        }
        if let Err(e) = mailbox.close_connection().await {
            warn!(error = %e, "failed to close mailbox connection");
        }
        info!(record = %self.record_key(), "channel closed");
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Publish one message on this node's outbound slot
    pub async fn send(&self, op: Operation, body: Value) -> Result<String, SendError> {
        if self.closed {
            return Err(SendError::Closed);
        }
        self.sender().send(op, body).await
    }

    /// A sender sharing this provider's session
    pub fn sender(&self) -> OutboundSender {
        OutboundSender::new(self.session.clone())
    }

    /// Read and verify the inbound slot once, bypassing the worker
    pub async fn receive_once(&self) -> Result<InboundValue, MailboxError> {
        self.session.read_inbound().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.session.stats().snapshot()
    }
}

impl Drop for ChannelProvider {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            let _ = worker.stop_tx.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_crypto::CryptoSuite;
    use crate::core_identity::MemoryKeystore;
    use crate::core_mailbox::{MemoryMailbox, RecordSchema};
    use crate::core_channel::HandlerResult;
    use crate::core_mailbox::Slot;
    use crate::test_utils::{wait_until, ChannelPair, RecordingHandler, DEFAULT_TEST_TIMEOUT};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn provisioned(role: Role) -> (MemoryKeystore, Arc<MemoryMailbox>, Keypair) {
        let keypair = Keypair::generate();
        let other = Keypair::generate();
        let keystore = MemoryKeystore::with_keypair(keypair.clone());
        let mailbox = Arc::new(MemoryMailbox::new());

        let schema = match role {
            Role::Agent => RecordSchema::two_party(*keypair.public_id(), *other.public_id()),
            Role::WisdomAuthority => {
                RecordSchema::two_party(*other.public_id(), *keypair.public_id())
            }
        };
        let handle = mailbox.create_record(schema, &keypair).await.unwrap();
        keystore.save_record_key(handle.key()).unwrap();
        mailbox.close(handle).await.unwrap();
        (keystore, mailbox, other)
    }

    #[tokio::test]
    async fn test_open_requires_keypair() {
        let keystore = MemoryKeystore::new();
        let mailbox = Arc::new(MemoryMailbox::new());
        let result = ChannelProvider::open(ProviderOptions::new(Role::Agent), &keystore, mailbox).await;
        assert!(matches!(
            result,
            Err(ChannelError::Provisioning(provisioning::ProvisioningError::MissingKeypair))
        ));
    }

    #[tokio::test]
    async fn test_open_requires_record() {
        let keystore = MemoryKeystore::with_keypair(Keypair::generate());
        let mailbox = Arc::new(MemoryMailbox::new());
        let result = ChannelProvider::open(ProviderOptions::new(Role::Agent), &keystore, mailbox).await;
        assert!(matches!(
            result,
            Err(ChannelError::Provisioning(provisioning::ProvisioningError::MissingRecord))
        ));
    }

    #[tokio::test]
    async fn test_unknown_record_is_connection_error() {
        let keystore = MemoryKeystore::with_keypair(Keypair::generate());
        let mailbox = Arc::new(MemoryMailbox::new());
        let options = ProviderOptions::new(Role::Agent).with_record_key(RecordKey::generate());
        let result = ChannelProvider::open(options, &keystore, mailbox).await;
        assert!(matches!(result, Err(ChannelError::Connection(_))));
    }

    #[tokio::test]
    async fn test_peer_secret_selection() {
        let (keystore, mailbox, other) = provisioned(Role::Agent).await;
        let options = ProviderOptions::new(Role::Agent).with_auth_key(AuthKeySource::PeerSecret);

        let result = ChannelProvider::open(options.clone(), &keystore, mailbox.clone()).await;
        assert!(matches!(result, Err(ChannelError::AmbiguousPeer(0))));

        let result = ChannelProvider::open(
            options.clone().with_peer(*other.public_id()),
            &keystore,
            mailbox.clone(),
        )
        .await;
        assert!(matches!(result, Err(ChannelError::MissingSharedSecret(_))));

        let local = keystore.load_keypair().unwrap();
        let secret = XChaChaSuite::new()
            .key_agreement(local.secret(), other.public_id())
            .unwrap();
        keystore.save_secret(other.public_id(), &secret).unwrap();

        let provider = ChannelProvider::open(options, &keystore, mailbox).await.unwrap();
        assert_eq!(provider.session().peer(), Some(other.public_id()));
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (keystore, mailbox, _) = provisioned(Role::WisdomAuthority).await;
        let mut provider =
            ChannelProvider::open(ProviderOptions::new(Role::WisdomAuthority), &keystore, mailbox.clone())
                .await
                .unwrap();
        assert_eq!(provider.state(), ProviderState::Stopped);
        assert_eq!(mailbox.open_handles(), 1);

        let handler = Arc::new(RecordingHandler::new());
        provider.start(handler.clone()).unwrap();
        assert_eq!(provider.state(), ProviderState::Running);
        assert!(matches!(provider.start(handler.clone()), Err(ChannelError::AlreadyRunning)));

        provider.stop().await;
        assert_eq!(provider.state(), ProviderState::Stopped);
        assert_eq!(mailbox.open_handles(), 0);
        assert!(!mailbox.is_connected());

        provider.stop().await;
        assert!(matches!(provider.start(handler), Err(ChannelError::Closed)));
        assert!(matches!(
            provider.send(Operation::Observe, json!({})).await,
            Err(SendError::Closed)
        ));
    }

    /// Blocks forever inside the SPEAK handler
    struct StuckHandler {
        entered: Arc<AtomicBool>,
    }

    #[async_trait]
    impl OperationHandler for StuckHandler {
        async fn on_speak(&self, _body: Value) -> HandlerResult {
            self.entered.store(true, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stop_within_aborts_a_stuck_worker() {
        let mut pair = ChannelPair::new().await.unwrap();
        let entered = Arc::new(AtomicBool::new(false));
        pair.wa.start(Arc::new(StuckHandler { entered: entered.clone() })).unwrap();

        pair.agent.send(Operation::Speak, json!({})).await.unwrap();
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || entered.load(Ordering::SeqCst)).await);

        assert!(!pair.wa.stop_within(Duration::from_millis(50)).await);
        assert_eq!(pair.wa.state(), ProviderState::Stopped);

        // record and connection were released despite the abort
        let mailbox = pair.wa.session().mailbox();
        assert!(matches!(
            mailbox.get(pair.wa.session().handle(), Slot::AGENT_TO_WA, true).await,
            Err(MailboxError::Disconnected)
        ));
        assert!(pair.wa.stop_within(Duration::ZERO).await);
        pair.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_within_drains_an_idle_worker() {
        let mut pair = ChannelPair::new().await.unwrap();
        pair.wa.start(Arc::new(RecordingHandler::new())).unwrap();
        assert!(pair.wa.stop_within(Duration::from_secs(2)).await);
        assert!(pair.wa.is_closed());
        pair.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_rejects_wrong_direction_and_unknown() {
        let (keystore, mailbox, _) = provisioned(Role::Agent).await;
        let provider = ChannelProvider::open(ProviderOptions::new(Role::Agent), &keystore, mailbox)
            .await
            .unwrap();

        assert!(matches!(
            provider.send(Operation::Observe, json!({})).await,
            Err(SendError::WrongDirection { .. })
        ));
        assert!(matches!(
            provider.send(Operation::parse("PING"), json!({})).await,
            Err(SendError::UnknownOperation(_))
        ));
        assert!(provider.send(Operation::Speak, json!({"text": "hi"})).await.is_ok());
        assert_eq!(provider.stats().sent, 1);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let (keystore, mailbox, _) = provisioned(Role::Agent).await;
        let provider = ChannelProvider::open(ProviderOptions::new(Role::Agent), &keystore, mailbox)
            .await
            .unwrap();

        let big = "x".repeat(crate::core_mailbox::MAX_VALUE_LEN);
        assert!(matches!(
            provider.send(Operation::Speak, json!({ "text": big })).await,
            Err(SendError::PayloadTooLarge { .. })
        ));
    }
}
