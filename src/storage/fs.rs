use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::{ListPage, ObjectMetadata, ObjectStore, ObjectSummary, StoreError};

const METADATA_SUFFIX: &str = ".meta.json";
const TEMP_SUFFIX: &str = ".tmp";

/// Bucket on local disk
///
/// Object `a/b.webp` lives at `<root>/a/b.webp`, its metadata in the
/// sidecar `<root>/a/b.webp.meta.json`. Listing is lexicographic by key and
/// the continuation token is the last key of the previous page.
pub struct FsObjectStore {
    root: PathBuf,
    page_size: usize,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            root: root.into(),
            page_size: page_size.max(1),
        }
    }

    /// Resolve a key to its path, refusing anything that escapes the root
    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn metadata_path(object_path: &Path) -> PathBuf {
        let mut name = object_path.as_os_str().to_owned();
        name.push(METADATA_SUFFIX);
        PathBuf::from(name)
    }

    /// Children of `dir` in key order. Directory keys carry a trailing `/`
    /// so that sorting them as strings matches the order of the keys below.
    async fn sorted_children(&self, dir: &Path, dir_key: &str) -> Result<Vec<Entry>, StoreError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("Skipping non UTF-8 entry {:?} in {}", raw, dir.display());
                    continue;
                }
            };

            let is_dir = entry.file_type().await?.is_dir();
            if !is_dir && (name.ends_with(METADATA_SUFFIX) || name.ends_with(TEMP_SUFFIX)) {
                continue;
            }

            let key = if is_dir {
                format!("{}{}/", dir_key, name)
            } else {
                format!("{}{}", dir_key, name)
            };
            children.push(Entry {
                key,
                path: entry.path(),
                is_dir,
            });
        }

        children.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(children)
    }
}

struct Entry {
    key: String,
    path: PathBuf,
    is_dir: bool,
}

/// Every key below a directory whose key is `dir_key` sorts before `after`
fn subtree_precedes(dir_key: &str, after: &str) -> bool {
    dir_key < after && !after.starts_with(dir_key)
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    /// Walks the tree in key order and stops one key past the page, so a
    /// call reads only the directories on the path to the token and the page.
    async fn list_objects(
        &self,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let (dir, dir_key) = match prefix.trim_end_matches('/') {
            "" => (self.root.clone(), String::new()),
            trimmed => (self.object_path(trimmed)?, format!("{}/", trimmed)),
        };

        let mut keys: Vec<String> = Vec::with_capacity(self.page_size + 1);
        let mut stack = vec![self.sorted_children(&dir, &dir_key).await?.into_iter()];

        while keys.len() <= self.page_size {
            let Some(level) = stack.last_mut() else {
                break;
            };
            let Some(entry) = level.next() else {
                stack.pop();
                continue;
            };

            if entry.is_dir {
                if token.is_some_and(|after| subtree_precedes(&entry.key, after)) {
                    continue;
                }
                let children = self.sorted_children(&entry.path, &entry.key).await?;
                stack.push(children.into_iter());
                continue;
            }

            if token.is_some_and(|after| entry.key.as_str() <= after) {
                continue;
            }
            if entry.key.starts_with(prefix) {
                keys.push(entry.key);
            }
        }

        let next_token = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };

        debug!(
            "Listed {} objects under {} (more: {})",
            keys.len(),
            prefix,
            next_token.is_some()
        );

        Ok(ListPage {
            objects: keys
                .into_iter()
                .map(|key| ObjectSummary { key })
                .collect(),
            next_token,
        })
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<ObjectMetadata>, StoreError> {
        let object_path = self.object_path(key)?;
        if !fs::try_exists(&object_path).await? {
            return Ok(None);
        }

        match fs::read(Self::metadata_path(&object_path)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Some(ObjectMetadata::default()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_metadata(
        &self,
        key: &str,
        tags: HashMap<String, String>,
        content_type: Option<String>,
    ) -> Result<(), StoreError> {
        let object_path = self.object_path(key)?;
        if !fs::try_exists(&object_path).await? {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let metadata = ObjectMetadata { tags, content_type };
        let raw = serde_json::to_vec_pretty(&metadata)?;

        let target = Self::metadata_path(&object_path);
        let mut temp = target.clone().into_os_string();
        temp.push(TEMP_SUFFIX);

        fs::write(&temp, raw).await?;
        fs::rename(&temp, &target).await?;
        Ok(())
    }
}
