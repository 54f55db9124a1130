use thiserror::Error;

use crate::core_crypto::CryptoError;
use crate::core_identity::{KeystoreError, PublicId, Role};
use crate::core_mailbox::MailboxError;
use crate::core_registry::RegistryError;

/// Provisioning failures; the messages are shown to operators as-is
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("No keypair found; run `keygen` first")]
    MissingKeypair,

    #[error("A keypair already exists ({0}); pass --force to replace it")]
    AlreadyProvisioned(PublicId),

    #[error("No {0} profile registered; pass --peer-key or register the peer first")]
    NoPeerFound(Role),

    #[error("Peer key is this node's own public id")]
    SelfPeer,

    #[error("No mailbox record; run `create-mailbox` or set WISDOM_CHANNEL_RECORD_KEY")]
    MissingRecord,

    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
