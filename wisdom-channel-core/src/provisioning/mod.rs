//! Key and secret lifecycle
//!
//! Offline steps that prepare a node before its channel can start:
//! generating the keypair, creating the shared mailbox record, deriving
//! the pairwise secret and advertising a profile. Where a step needs the
//! counterpart's public id and none is given, the first profile the
//! registry lists for the counterpart role is used.

use std::sync::Arc;
use tracing::{info, warn};

mod error;

pub use error::{ProvisioningError, ProvisioningResult};

use crate::core_crypto::{CryptoSuite, XChaChaSuite};
use crate::core_identity::{Keypair, Keystore, PublicId, Role};
use crate::core_mailbox::{MailboxStore, RecordKey, RecordSchema};
use crate::core_registry::{DiscoveryRegistry, Profile};

/// Load the node keypair, mapping absence to `MissingKeypair`
pub fn load_keypair(keystore: &dyn Keystore) -> ProvisioningResult<Keypair> {
    keystore.load_keypair().map_err(|e| {
        if e.is_not_found() {
            ProvisioningError::MissingKeypair
        } else {
            e.into()
        }
    })
}

/// Load the stored record key, mapping absence to `MissingRecord`
pub fn load_record_key(keystore: &dyn Keystore) -> ProvisioningResult<RecordKey> {
    keystore.load_record_key().map_err(|e| {
        if e.is_not_found() {
            ProvisioningError::MissingRecord
        } else {
            e.into()
        }
    })
}

pub struct Provisioner {
    role: Role,
    keystore: Arc<dyn Keystore>,
    mailbox: Arc<dyn MailboxStore>,
    registry: Arc<dyn DiscoveryRegistry>,
    suite: Arc<dyn CryptoSuite>,
}

impl Provisioner {
    pub fn new(
        role: Role,
        keystore: Arc<dyn Keystore>,
        mailbox: Arc<dyn MailboxStore>,
        registry: Arc<dyn DiscoveryRegistry>,
    ) -> Self {
        Provisioner {
            role,
            keystore,
            mailbox,
            registry,
            suite: Arc::new(XChaChaSuite::new()),
        }
    }

    pub fn with_suite(mut self, suite: Arc<dyn CryptoSuite>) -> Self {
        self.suite = suite;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Create and persist a keypair. An existing keypair is only replaced
    /// when `force` is set.
    pub fn generate_keypair(&self, force: bool) -> ProvisioningResult<PublicId> {
        match self.keystore.load_keypair() {
            Ok(existing) if !force => {
                return Err(ProvisioningError::AlreadyProvisioned(*existing.public_id()));
            }
            Ok(existing) => {
                warn!(old = %existing.public_id(), "replacing existing keypair");
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let keypair = self.suite.generate_keypair();
        self.keystore.save_keypair(&keypair)?;
        info!(public_id = %keypair.public_id(), role = %self.role, "keypair generated");
        Ok(*keypair.public_id())
    }

    pub fn local_keypair(&self) -> ProvisioningResult<Keypair> {
        load_keypair(self.keystore.as_ref())
    }

    /// `peer` if given, else the first registered counterpart
    pub async fn resolve_peer(&self, peer: Option<PublicId>) -> ProvisioningResult<PublicId> {
        if let Some(peer) = peer {
            return Ok(peer);
        }
        let counterpart = self.role.counterpart();
        let profiles = self.registry.list(counterpart).await?;
        let first = profiles
            .into_iter()
            .next()
            .ok_or(ProvisioningError::NoPeerFound(counterpart))?;
        info!(peer = %first.public_id, name = %first.name, "resolved peer from registry");
        Ok(first.public_id)
    }

    /// Create a record both nodes can write and remember its key
    pub async fn create_mailbox(&self, peer: Option<PublicId>) -> ProvisioningResult<RecordKey> {
        let local = self.local_keypair()?;
        let peer = self.resolve_peer(peer).await?;

        let schema = if &peer == local.public_id() {
            warn!(public_id = %peer, "peer shares this keypair; one identity owns both slots");
            RecordSchema::shared(peer)
        } else {
            match self.role {
                Role::Agent => RecordSchema::two_party(*local.public_id(), peer),
                Role::WisdomAuthority => RecordSchema::two_party(peer, *local.public_id()),
            }
        };

        let handle = self.mailbox.create_record(schema, &local).await?;
        let key = *handle.key();
        self.mailbox.close(handle).await?;
        self.keystore.save_record_key(&key)?;

        info!(record = %key, peer = %peer, "mailbox record created");
        Ok(key)
    }

    /// Key agreement with `peer`; replaces any earlier secret for that peer
    pub async fn derive_shared_secret(&self, peer: Option<PublicId>) -> ProvisioningResult<PublicId> {
        let local = self.local_keypair()?;
        let peer = self.resolve_peer(peer).await?;
        if &peer == local.public_id() {
            return Err(ProvisioningError::SelfPeer);
        }

        let secret = self.suite.key_agreement(local.secret(), &peer)?;
        self.keystore.save_secret(&peer, &secret)?;

        info!(peer = %peer, "shared secret stored");
        Ok(peer)
    }

    /// Advertise this node under its role
    pub async fn register_profile(&self, name: &str) -> ProvisioningResult<Profile> {
        let local = self.local_keypair()?;
        let profile = Profile::new(name.trim(), *local.public_id());
        self.registry.advertise(self.role, profile.clone()).await?;

        info!(name = %profile.name, role = %self.role, "profile registered");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_identity::MemoryKeystore;
    use crate::core_mailbox::{MemoryMailbox, Slot};
    use crate::core_registry::MemoryRegistry;

    struct Fixture {
        keystore: Arc<MemoryKeystore>,
        mailbox: Arc<MemoryMailbox>,
        registry: Arc<MemoryRegistry>,
        provisioner: Provisioner,
    }

    fn fixture(role: Role) -> Fixture {
        let keystore = Arc::new(MemoryKeystore::new());
        let mailbox = Arc::new(MemoryMailbox::new());
        let registry = Arc::new(MemoryRegistry::new());
        let provisioner =
            Provisioner::new(role, keystore.clone(), mailbox.clone(), registry.clone());
        Fixture { keystore, mailbox, registry, provisioner }
    }

    #[test]
    fn test_keygen_refuses_to_overwrite() {
        let f = fixture(Role::Agent);
        let first = f.provisioner.generate_keypair(false).unwrap();

        match f.provisioner.generate_keypair(false) {
            Err(ProvisioningError::AlreadyProvisioned(id)) => assert_eq!(id, first),
            other => panic!("expected AlreadyProvisioned, got {:?}", other),
        }
        assert_eq!(f.keystore.load_keypair().unwrap().public_id(), &first);

        let second = f.provisioner.generate_keypair(true).unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_steps_need_a_keypair() {
        let f = fixture(Role::Agent);
        let peer = *Keypair::generate().public_id();
        assert!(matches!(
            f.provisioner.create_mailbox(Some(peer)).await,
            Err(ProvisioningError::MissingKeypair)
        ));
        assert!(matches!(
            f.provisioner.register_profile("agent").await,
            Err(ProvisioningError::MissingKeypair)
        ));
    }

    #[tokio::test]
    async fn test_no_peer_found() {
        let f = fixture(Role::Agent);
        f.provisioner.generate_keypair(false).unwrap();
        match f.provisioner.create_mailbox(None).await {
            Err(ProvisioningError::NoPeerFound(role)) => assert_eq!(role, Role::WisdomAuthority),
            other => panic!("expected NoPeerFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_resolved_from_registry() {
        let f = fixture(Role::WisdomAuthority);
        f.provisioner.generate_keypair(false).unwrap();

        let agent = Keypair::generate();
        f.registry
            .advertise(Role::Agent, Profile::new("first", *agent.public_id()))
            .await
            .unwrap();
        f.registry
            .advertise(Role::Agent, Profile::new("second", *Keypair::generate().public_id()))
            .await
            .unwrap();

        let key = f.provisioner.create_mailbox(None).await.unwrap();
        assert_eq!(f.keystore.load_record_key().unwrap(), key);

        // the resolved agent owns slot 0 of the new record
        let handle = f.mailbox.open_record(&key, Some(&agent)).await.unwrap();
        f.mailbox.set(&handle, Slot::AGENT_TO_WA, b"x").await.unwrap();
        assert!(f.mailbox.set(&handle, Slot::WA_TO_AGENT, b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_derived_secrets_match_across_nodes() {
        let agent = fixture(Role::Agent);
        let wa = fixture(Role::WisdomAuthority);
        let agent_id = agent.provisioner.generate_keypair(false).unwrap();
        let wa_id = wa.provisioner.generate_keypair(false).unwrap();

        agent.provisioner.derive_shared_secret(Some(wa_id)).await.unwrap();
        wa.provisioner.derive_shared_secret(Some(agent_id)).await.unwrap();

        let a = agent.keystore.load_secret(&wa_id).unwrap();
        let b = wa.keystore.load_secret(&agent_id).unwrap();
        assert_eq!(a, b);

        // re-derivation overwrites, it does not add
        agent.provisioner.derive_shared_secret(Some(wa_id)).await.unwrap();
        assert_eq!(agent.keystore.load_secrets().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_self_peer_rejected() {
        let f = fixture(Role::Agent);
        let me = f.provisioner.generate_keypair(false).unwrap();
        assert!(matches!(
            f.provisioner.derive_shared_secret(Some(me)).await,
            Err(ProvisioningError::SelfPeer)
        ));
    }

    #[tokio::test]
    async fn test_shared_keypair_mailbox() {
        let f = fixture(Role::Agent);
        let me = f.provisioner.generate_keypair(false).unwrap();
        let key = f.provisioner.create_mailbox(Some(me)).await.unwrap();

        let local = f.keystore.load_keypair().unwrap();
        let handle = f.mailbox.open_record(&key, Some(&local)).await.unwrap();
        f.mailbox.set(&handle, Slot::AGENT_TO_WA, b"a").await.unwrap();
        f.mailbox.set(&handle, Slot::WA_TO_AGENT, b"b").await.unwrap();
    }

    #[tokio::test]
    async fn test_register_profile_replaces() {
        let f = fixture(Role::Agent);
        f.provisioner.generate_keypair(false).unwrap();
        f.provisioner.register_profile("scout").await.unwrap();
        f.provisioner.register_profile("scout-2").await.unwrap();

        let agents = f.registry.list(Role::Agent).await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "scout-2");
    }
}
