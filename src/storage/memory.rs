//! In-memory object store used by the engine tests, with fault injection.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ListPage, ObjectMetadata, ObjectStore, ObjectSummary, StoreError};

pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Option<ObjectMetadata>>>,
    page_size: usize,
    failing_listings: AtomicUsize,
    failing_lookups: AtomicBool,
    vanishing_metadata: Mutex<HashSet<String>>,
    failing_rewrites: Mutex<HashSet<String>>,
    panicking_rewrites: Mutex<HashSet<String>>,
    list_delay: Mutex<Duration>,
    list_calls: AtomicUsize,
    replace_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size,
            failing_listings: AtomicUsize::new(0),
            failing_lookups: AtomicBool::new(false),
            vanishing_metadata: Mutex::new(HashSet::new()),
            failing_rewrites: Mutex::new(HashSet::new()),
            panicking_rewrites: Mutex::new(HashSet::new()),
            list_delay: Mutex::new(Duration::ZERO),
            list_calls: AtomicUsize::new(0),
            replace_calls: AtomicUsize::new(0),
        }
    }

    /// Insert an object tagged with `credential` under `tag`
    pub fn put_tagged(&self, key: &str, tag: &str, credential: &str) {
        let metadata = ObjectMetadata {
            tags: HashMap::from([
                (tag.to_string(), credential.to_string()),
                ("width".to_string(), "320".to_string()),
            ]),
            content_type: Some("image/webp".to_string()),
        };
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Some(metadata));
    }

    /// Insert an object that carries no metadata at all
    pub fn put_bare(&self, key: &str) {
        self.objects.lock().unwrap().insert(key.to_string(), None);
    }

    /// The next `count` listing calls fail
    pub fn fail_next_listings(&self, count: usize) {
        self.failing_listings.store(count, Ordering::SeqCst);
    }

    /// Metadata lookups fail while set; listings keep working
    pub fn fail_metadata_lookups(&self, failing: bool) {
        self.failing_lookups.store(failing, Ordering::SeqCst);
    }

    /// `key` loses its metadata right after the first lookup reads it
    pub fn drop_metadata_after_first_read(&self, key: &str) {
        self.vanishing_metadata.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_rewrites_for(&self, key: &str) {
        self.failing_rewrites.lock().unwrap().insert(key.to_string());
    }

    /// Rewriting `key` panics, taking its whole batch down with it
    pub fn panic_on_rewrite_of(&self, key: &str) {
        self.panicking_rewrites.lock().unwrap().insert(key.to_string());
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    pub fn metadata(&self, key: &str) -> Option<ObjectMetadata> {
        self.objects.lock().unwrap().get(key).cloned().flatten()
    }

    pub fn count_tagged(&self, tag: &str, credential: &str) -> usize {
        self.objects
            .lock()
            .unwrap()
            .values()
            .flatten()
            .filter(|m| m.tags.get(tag).map(String::as_str) == Some(credential))
            .count()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_objects(
        &self,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failing_listings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }

        let objects = self.objects.lock().unwrap();
        let keys: Vec<&String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| token.map_or(true, |t| k.as_str() > t))
            .collect();

        let page: Vec<ObjectSummary> = keys
            .iter()
            .take(self.page_size)
            .map(|k| ObjectSummary { key: (*k).clone() })
            .collect();
        let next_token = if keys.len() > page.len() {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<ObjectMetadata>, StoreError> {
        if self.failing_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("head failed for {}", key)));
        }

        let mut objects = self.objects.lock().unwrap();
        let found = objects.get(key).map(|m| m.clone().unwrap_or_default());
        if self.vanishing_metadata.lock().unwrap().remove(key) {
            if let Some(slot) = objects.get_mut(key) {
                *slot = None;
            }
        }
        Ok(found)
    }

    async fn replace_metadata(
        &self,
        key: &str,
        tags: HashMap<String, String>,
        content_type: Option<String>,
    ) -> Result<(), StoreError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);

        if self.panicking_rewrites.lock().unwrap().contains(key) {
            panic!("batch operation rejected at {}", key);
        }
        if self.failing_rewrites.lock().unwrap().contains(key) {
            return Err(StoreError::Unavailable(format!("copy rejected for {}", key)));
        }

        let mut objects = self.objects.lock().unwrap();
        let slot = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        *slot = Some(ObjectMetadata { tags, content_type });
        Ok(())
    }
}
