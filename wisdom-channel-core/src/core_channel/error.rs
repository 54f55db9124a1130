use thiserror::Error;

use super::handlers::HandlerError;
use crate::config::ConfigError;
use crate::core_crypto::CryptoError;
use crate::core_envelope::{EnvelopeError, Operation};
use crate::core_identity::{KeystoreError, PublicId, Role};
use crate::core_mailbox::MailboxError;
use crate::provisioning::ProvisioningError;

/// Startup and lifecycle failures of a provider
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error("Mailbox unreachable: {0}")]
    Connection(#[source] MailboxError),

    #[error("No shared secret for peer {0}; run derive-secret first")]
    MissingSharedSecret(PublicId),

    #[error("No peer configured and the secret map holds {0} entries")]
    AmbiguousPeer(usize),

    #[error("Crypto setup failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Worker is already running")]
    AlreadyRunning,

    #[error("Provider has been stopped")]
    Closed,
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Failure of one `send()`
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Unknown operation {0} cannot be sent")]
    UnknownOperation(Operation),

    #[error("Role {role} may not send {op}")]
    WrongDirection { role: Role, op: Operation },

    #[error("Encoded message is {len} bytes, limit is {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Encryption error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Mailbox write failed: {0}")]
    Transport(#[from] MailboxError),

    #[error("Provider has been stopped")]
    Closed,
}

/// Why an inbound value was discarded before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Truncated,
    Decryption,
    Malformed,
    Integrity,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Truncated => "truncated",
            DropReason::Decryption => "decryption",
            DropReason::Malformed => "malformed",
            DropReason::Integrity => "integrity",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure that ends one poll iteration and triggers the error backoff
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Mailbox read failed: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Handler for {op} failed: {source}")]
    Handler {
        op: Operation,
        #[source]
        source: HandlerError,
    },
}
