use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod fs;
#[cfg(test)]
pub mod memory;

pub use fs::FsObjectStore;

/// Object store errors
///
/// Every variant is treated as transient by the migration engine: the
/// worker execution fails and the retry controller decides what happens next.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object {0} has no metadata")]
    MissingMetadata(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("object store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt object metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// A single entry of a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
}

/// One page of a paginated listing.
/// `next_token` is `None` once the listing is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

/// User metadata attached to an object
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub tags: HashMap<String, String>,
    pub content_type: Option<String>,
}

/// Object store holding the derived artifacts
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the objects under `prefix`, starting after `token` when given.
    async fn list_objects(
        &self,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    /// Fetch an object's metadata. `Ok(None)` when the object does not exist.
    async fn get_metadata(&self, key: &str) -> Result<Option<ObjectMetadata>, StoreError>;

    /// Replace an object's metadata in place. Content is never touched.
    async fn replace_metadata(
        &self,
        key: &str,
        tags: HashMap<String, String>,
        content_type: Option<String>,
    ) -> Result<(), StoreError>;
}

/// Storage prefix for everything produced on behalf of `tenant`
pub fn tenant_prefix(tenant: &str) -> String {
    format!("{}/", tenant)
}
