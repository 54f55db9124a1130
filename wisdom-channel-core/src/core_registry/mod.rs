//! Discovery registry
//!
//! Nodes advertise a display name and public id under their role so that
//! provisioning can find a counterpart without the operator pasting keys
//! around. A node has at most one profile per role; advertising again
//! replaces it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_identity::{PublicId, Role};

mod file;
mod memory;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;

/// Advertised node profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub public_id: PublicId,
}

impl Profile {
    pub fn new(name: impl Into<String>, public_id: PublicId) -> Self {
        Profile { name: name.into(), public_id }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Profile name must not be empty")]
    EmptyName,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[async_trait]
pub trait DiscoveryRegistry: Send + Sync {
    /// Publish `profile` under `role`, replacing any earlier profile with
    /// the same public id
    async fn advertise(&self, role: Role, profile: Profile) -> RegistryResult<()>;

    /// Profiles advertised under `role`, in registration order
    async fn list(&self, role: Role) -> RegistryResult<Vec<Profile>>;
}

/// Insert or replace in place, keyed by public id
fn upsert(profiles: &mut Vec<Profile>, profile: Profile) -> RegistryResult<()> {
    if profile.name.trim().is_empty() {
        return Err(RegistryError::EmptyName);
    }
    match profiles.iter_mut().find(|p| p.public_id == profile.public_id) {
        Some(existing) => *existing = profile,
        None => profiles.push(profile),
    }
    Ok(())
}
