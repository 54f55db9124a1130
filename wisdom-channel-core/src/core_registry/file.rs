//! JSON-file registry
//!
//! The whole registry is one document, `{"agent": [...], "wa": [...]}`,
//! rewritten atomically on every advertisement.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{upsert, DiscoveryRegistry, Profile, RegistryError, RegistryResult};
use crate::core_identity::Role;

type Document = BTreeMap<Role, Vec<Profile>>;

pub struct FileRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileRegistry {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> RegistryResult<Document> {
        match fs::read(&self.path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| RegistryError::Serialization(e.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, document: &Document) -> RegistryResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(document)
            .map_err(|e| RegistryError::Serialization(e.to_string()))?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DiscoveryRegistry for FileRegistry {
    async fn advertise(&self, role: Role, profile: Profile) -> RegistryResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let name = profile.name.clone();
        upsert(document.entry(role).or_default(), profile)?;
        self.store(&document).await?;
        debug!(role = %role, name = %name, path = %self.path.display(), "profile advertised");
        Ok(())
    }

    async fn list(&self, role: Role) -> RegistryResult<Vec<Profile>> {
        Ok(self.load().await?.remove(&role).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_identity::Keypair;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let registry = FileRegistry::new(dir.path().join("registry.json"));
        assert!(registry.list(Role::Agent).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_profiles_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("registry.json");
        let wa = *Keypair::generate().public_id();

        FileRegistry::new(&path)
            .advertise(Role::WisdomAuthority, Profile::new("authority", wa))
            .await
            .unwrap();

        let reopened = FileRegistry::new(&path);
        let was = reopened.list(Role::WisdomAuthority).await.unwrap();
        assert_eq!(was, vec![Profile::new("authority", wa)]);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["wa"][0]["name"], "authority");
    }

    #[tokio::test]
    async fn test_reregistration_overwrites() {
        let dir = TempDir::new().unwrap();
        let registry = FileRegistry::new(dir.path().join("registry.json"));
        let id = *Keypair::generate().public_id();

        registry.advertise(Role::Agent, Profile::new("one", id)).await.unwrap();
        registry.advertise(Role::Agent, Profile::new("two", id)).await.unwrap();

        let agents = registry.list(Role::Agent).await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "two");
    }
}
