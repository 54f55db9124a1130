use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{upsert, DiscoveryRegistry, Profile, RegistryResult};
use crate::core_identity::Role;

/// In-process registry, cloned handles share state
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    profiles: Arc<RwLock<BTreeMap<Role, Vec<Profile>>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiscoveryRegistry for MemoryRegistry {
    async fn advertise(&self, role: Role, profile: Profile) -> RegistryResult<()> {
        let mut profiles = self.profiles.write().await;
        upsert(profiles.entry(role).or_default(), profile)
    }

    async fn list(&self, role: Role) -> RegistryResult<Vec<Profile>> {
        Ok(self.profiles.read().await.get(&role).cloned().unwrap_or_default())
    }
}
