//! Subcommand implementations
//!
//! Results meant for scripts go to stdout; logs go to stderr.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use wisdom_channel_core::config::Config;
use wisdom_channel_core::core_channel::{
    ChannelProvider, HandlerResult, InboundValue, OperationHandler, ProviderOptions,
};
use wisdom_channel_core::core_envelope::Operation;
use wisdom_channel_core::core_identity::{FileKeystore, Keystore, PublicId};
use wisdom_channel_core::core_mailbox::{FileMailbox, MailboxStore, RecordKey};
use wisdom_channel_core::core_registry::FileRegistry;
use wisdom_channel_core::provisioning::{self, Provisioner};
use wisdom_channel_core::shutdown::{install_signal_handlers, ShutdownCoordinator};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Logs every verified message it receives
struct LoggingHandler;

impl LoggingHandler {
    fn log(&self, op: Operation, body: Value) -> HandlerResult {
        info!(op = %op, body = %body, "message received");
        Ok(())
    }
}

#[async_trait]
impl OperationHandler for LoggingHandler {
    async fn on_speak(&self, body: Value) -> HandlerResult {
        self.log(Operation::Speak, body)
    }

    async fn on_defer(&self, body: Value) -> HandlerResult {
        self.log(Operation::Defer, body)
    }

    async fn on_memory(&self, body: Value) -> HandlerResult {
        self.log(Operation::Memory, body)
    }

    async fn on_observe(&self, body: Value) -> HandlerResult {
        self.log(Operation::Observe, body)
    }

    async fn on_correction(&self, body: Value) -> HandlerResult {
        self.log(Operation::Correction, body)
    }
}

pub struct Context {
    config: Config,
    keystore: Arc<FileKeystore>,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        let keystore = FileKeystore::new(config.node.state_dir.clone()).with_context(|| {
            format!("cannot open state directory {}", config.node.state_dir.display())
        })?;
        Ok(Context { config, keystore: Arc::new(keystore) })
    }

    async fn mailbox(&self) -> Result<Arc<FileMailbox>> {
        let mailbox = FileMailbox::open(self.config.mailbox.dir.clone())
            .await
            .with_context(|| {
                format!("cannot open mailbox directory {}", self.config.mailbox.dir.display())
            })?;
        Ok(Arc::new(mailbox))
    }

    async fn provisioner(&self) -> Result<Provisioner> {
        Ok(Provisioner::new(
            self.config.node.role,
            self.keystore.clone(),
            self.mailbox().await?,
            Arc::new(FileRegistry::new(self.config.registry.path.clone())),
        ))
    }

    pub async fn keygen(&self, force: bool) -> Result<()> {
        let public_id = self.provisioner().await?.generate_keypair(force)?;
        println!("{}", public_id);
        Ok(())
    }

    pub async fn create_mailbox(&self, peer: Option<PublicId>) -> Result<()> {
        let peer = peer.or(self.config.peer_key()?);
        let key = self.provisioner().await?.create_mailbox(peer).await?;
        println!("{}", key);
        Ok(())
    }

    pub async fn derive_secret(&self, peer: Option<PublicId>) -> Result<()> {
        let peer = peer.or(self.config.peer_key()?);
        let peer = self.provisioner().await?.derive_shared_secret(peer).await?;
        println!("{}", peer);
        Ok(())
    }

    pub async fn register(&self, name: &str) -> Result<()> {
        let profile = self.provisioner().await?.register_profile(name).await?;
        println!("{} {} {}", self.config.node.role, profile.public_id, profile.name);
        Ok(())
    }

    pub fn whoami(&self) -> Result<()> {
        let keypair = provisioning::load_keypair(self.keystore.as_ref())?;
        let record = match self.config.record_key()? {
            Some(key) => Some(key),
            None => match self.keystore.load_record_key() {
                Ok(key) => Some(key),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            },
        };
        let peers: Vec<String> = self
            .keystore
            .load_secrets()?
            .keys()
            .map(|id| id.to_string())
            .collect();

        let report = json!({
            "role": self.config.node.role.as_str(),
            "public_id": keypair.public_id().to_string(),
            "record_key": record.map(|k| k.to_string()),
            "auth_key": self.config.channel.auth_key.as_str(),
            "peers": peers,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    async fn open_provider(&self, record_key: Option<RecordKey>) -> Result<ChannelProvider> {
        let mut options = ProviderOptions::from_config(&self.config)?;
        if let Some(key) = record_key {
            options = options.with_record_key(key);
        }
        let mailbox: Arc<dyn MailboxStore> = self.mailbox().await?;
        Ok(ChannelProvider::open(options, self.keystore.as_ref(), mailbox).await?)
    }

    pub async fn serve(&self) -> Result<()> {
        let mut provider = self.open_provider(None).await?;
        let coordinator = Arc::new(ShutdownCoordinator::new(SHUTDOWN_GRACE));
        install_signal_handlers(coordinator.clone())
            .context("cannot install signal handlers")?;

        provider.start(Arc::new(LoggingHandler))?;
        info!(
            role = %provider.role(),
            public_id = %provider.public_id(),
            record = %provider.record_key(),
            "serving; press Ctrl+C to stop"
        );

        coordinator.wait_for_shutdown().await;
        let grace = coordinator.grace();
        coordinator
            .run_cleanup(async {
                provider.stop_within(grace).await;
            })
            .await;
        if !provider.is_closed() {
            // cut short by a second signal
            provider.stop_within(Duration::ZERO).await;
        }

        let stats = provider.stats();
        info!(
            polls = stats.polls,
            dispatched = stats.dispatched,
            dropped = stats.dropped,
            errors = stats.errors,
            "worker finished"
        );
        Ok(())
    }

    pub async fn send(&self, op: &str, body: &str, record_key: Option<RecordKey>) -> Result<()> {
        let op = Operation::parse(&op.trim().to_uppercase());
        let body: Value = serde_json::from_str(body).context("--body is not valid JSON")?;

        let mut provider = self.open_provider(record_key).await?;
        let result = provider.send(op, body).await;
        provider.stop().await;

        println!("{}", result?);
        Ok(())
    }

    pub async fn recv(&self) -> Result<()> {
        let mut provider = self.open_provider(None).await?;
        let result = provider.receive_once().await;
        provider.stop().await;

        let report = match result? {
            InboundValue::Empty => json!({ "status": "empty" }),
            InboundValue::Dropped(reason) => json!({ "status": "dropped", "reason": reason.as_str() }),
            InboundValue::Message(envelope) => json!({
                "status": "message",
                "id": envelope.id(),
                "op": envelope.op().as_str(),
                "body": envelope.body(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
