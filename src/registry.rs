use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Credential registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    #[error("failed to persist registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed registry document: {0}")]
    Format(#[from] serde_json::Error),
}

/// Source of truth for each tenant's active credential
#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    /// Make `credential` the active key of `tenant`
    async fn commit_new_credential(
        &self,
        tenant: &str,
        credential: &str,
    ) -> Result<(), RegistryError>;

    fn find_tenant_by_credential(&self, credential: &str) -> Option<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TenantEntry {
    key: String,
}

/// Registry backed by an `apps.json` style document:
/// `{ "<tenant>": { "key": "<credential>" } }`
///
/// Commits are serialized by `commit_lock`: the document is written while it
/// is held, and the in-memory view changes only once the write succeeded.
pub struct JsonFileRegistry {
    path: Option<PathBuf>,
    tenants: RwLock<BTreeMap<String, TenantEntry>>,
    commit_lock: Mutex<()>,
}

impl JsonFileRegistry {
    /// Load the registry from `path`
    ///
    /// A missing file yields an empty registry that is created on the first
    /// commit. A file that exists but cannot be parsed is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let tenants = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Registry file {} not found, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Loaded {} tenants from {}", tenants.len(), path.display());
        Ok(Self {
            path: Some(path),
            tenants: RwLock::new(tenants),
            commit_lock: Mutex::new(()),
        })
    }

    /// Registry that lives only in memory
    #[cfg(test)]
    pub fn in_memory<I, T, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, K)>,
        T: Into<String>,
        K: Into<String>,
    {
        let tenants = entries
            .into_iter()
            .map(|(tenant, key)| (tenant.into(), TenantEntry { key: key.into() }))
            .collect();
        Self {
            path: None,
            tenants: RwLock::new(tenants),
            commit_lock: Mutex::new(()),
        }
    }

    async fn persist(path: &Path, raw: Vec<u8>) -> Result<(), RegistryError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        tokio::fs::write(&temp, raw).await?;
        tokio::fs::rename(&temp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialRegistry for JsonFileRegistry {
    async fn commit_new_credential(
        &self,
        tenant: &str,
        credential: &str,
    ) -> Result<(), RegistryError> {
        let _commit = self.commit_lock.lock().await;

        let mut updated = self.tenants.read().unwrap_or_else(PoisonError::into_inner).clone();
        let entry = updated
            .get_mut(tenant)
            .ok_or_else(|| RegistryError::UnknownTenant(tenant.to_string()))?;
        entry.key = credential.to_string();

        if let Some(path) = &self.path {
            let raw = serde_json::to_vec_pretty(&updated)?;
            if let Err(e) = Self::persist(path, raw).await {
                error!("Failed to write registry {}: {}", path.display(), e);
                return Err(e);
            }
        }

        *self.tenants.write().unwrap_or_else(PoisonError::into_inner) = updated;

        info!(tenant = %tenant, "Committed new credential");
        Ok(())
    }

    fn find_tenant_by_credential(&self, credential: &str) -> Option<String> {
        self.tenants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, entry)| entry.key == credential)
            .map(|(tenant, _)| tenant.clone())
    }
}
