//! wisdom-channel: store-and-forward secure channel between agents and a
//! Wisdom Authority over a shared key/value mailbox.

pub mod config;
pub mod core_channel;
pub mod core_crypto;
pub mod core_envelope;
pub mod core_identity;
pub mod core_mailbox;
pub mod core_registry;
pub mod logging;
pub mod metrics;
pub mod provisioning;
pub mod shutdown;
pub mod test_utils;

pub use config::{Config, ConfigError};
pub use core_channel::{
    ChannelError, ChannelProvider, OperationHandler, OutboundSender, ProviderOptions, SendError,
};
pub use core_envelope::{Envelope, Operation};
pub use core_identity::{Keypair, PublicId, Role};
pub use core_mailbox::{MailboxStore, RecordKey};
pub use logging::{init_logging, LogLevel};
pub use provisioning::{Provisioner, ProvisioningError};
