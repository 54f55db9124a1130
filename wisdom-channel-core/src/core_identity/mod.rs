//! Identity management module
//!
//! - `PublicId`: a node's X25519 public key
//! - `Keypair`, `SecretKey`, `SharedSecret`: zeroizing key material
//! - `Role`: agent or wisdom authority, and the slots each one owns
//! - `keystore`: persistence for keys, the record key and shared secrets

use thiserror::Error;

pub mod keypair;
pub mod keystore;
mod public_id;
mod role;

pub use keypair::{Keypair, SecretKey, SharedSecret};
pub use keystore::{FileKeystore, Keystore, KeystoreError, MemoryKeystore, SecretMap};
pub use public_id::{PublicId, PUBLIC_ID_LEN};
pub use role::Role;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid public id: {0}")]
    InvalidPublicId(String),

    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    #[error("Stored public id does not match the secret key")]
    KeyMismatch,

    #[error("Unknown role '{0}', expected 'agent' or 'wa'")]
    InvalidRole(String),
}
