//! In-process [`RemoteStore`] backed by a map per bucket.
//!
//! Used by the integration tests and by dry runs of the CLI. Supports fault
//! injection so batch error handling can be exercised without a network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::contract::{ObjectHead, RemoteStore};
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

type Buckets = HashMap<String, BTreeMap<String, StoredObject>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<Buckets>,
    failing_keys: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.create_bucket(bucket);
        store
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().entry(bucket.to_string()).or_default();
    }

    /// Every later operation touching `key` (or listing exactly that prefix)
    /// fails with a transport error.
    pub fn fail_on(&self, key: &str) {
        self.failing()
            .insert(key.to_string());
    }

    /// Operations on `key` wait for `delay` before answering.
    pub fn delay_on(&self, key: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), delay);
    }

    pub fn clear_failures(&self) {
        self.failing().clear();
    }

    /// Sorted keys of a bucket.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock().get(bucket).and_then(|b| b.get(key)).cloned()
    }

    /// Writes an object directly, bypassing fault injection and counters.
    pub fn insert_raw(&self, bucket: &str, key: &str, data: &[u8], metadata: HashMap<String, String>) {
        self.lock().entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: "application/octet-stream".to_string(),
                metadata,
            },
        );
    }

    /// Number of successful put and delete calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        // a poisoned map is still structurally valid
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn failing(&self) -> MutexGuard<'_, HashSet<String>> {
        self.failing_keys.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn check_fault(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let delay = self
            .delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing().contains(key) {
            return Err(StoreError::transport(bucket, key, "injected failure"));
        }
        Ok(())
    }

    fn missing_bucket(bucket: &str) -> StoreError {
        StoreError::Unavailable {
            bucket: bucket.to_string(),
            message: "no such bucket".to_string(),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn check_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        if self.lock().contains_key(bucket) {
            Ok(())
        } else {
            Err(Self::missing_bucket(bucket))
        }
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        self.check_fault(bucket, key).await?;
        let buckets = self.lock();
        let objects = buckets.get(bucket).ok_or_else(|| Self::missing_bucket(bucket))?;
        Ok(objects.get(key).map(|o| ObjectHead {
            size: o.data.len() as u64,
            metadata: o.metadata.clone(),
        }))
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.check_fault(bucket, key).await?;
        let buckets = self.lock();
        let objects = buckets.get(bucket).ok_or_else(|| Self::missing_bucket(bucket))?;
        objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check_fault(bucket, prefix).await?;
        let buckets = self.lock();
        let objects = buckets.get(bucket).ok_or_else(|| Self::missing_bucket(bucket))?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        self.check_fault(bucket, key).await?;
        let mut buckets = self.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.check_fault(bucket, key).await?;
        let mut buckets = self.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        objects.remove(key);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exists_after_put() {
        let store = MemoryStore::with_bucket("b");
        let path = "org/foo/bar/1.0/foo-bar-1.0.pom";
        assert!(store.head("b", path).await.unwrap().is_none());
        store
            .put("b", path, b"test content pom", "application/xml", &HashMap::new())
            .await
            .unwrap();
        let head = store.head("b", path).await.unwrap().unwrap();
        assert_eq!(head.size, 16);
    }

    #[tokio::test]
    async fn missing_bucket_is_unavailable() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.check_bucket("nope").await,
            Err(StoreError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn injected_failures_hit_only_the_given_key() {
        let store = MemoryStore::with_bucket("b");
        store.fail_on("a");
        assert!(store
            .put("b", "a", b"x", "text/plain", &HashMap::new())
            .await
            .is_err());
        assert!(store
            .put("b", "b", b"x", "text/plain", &HashMap::new())
            .await
            .is_ok());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn list_is_prefix_bounded() {
        let store = MemoryStore::with_bucket("b");
        for key in ["a/1", "a/2", "ab/1", "b/1"] {
            store.insert_raw("b", key, b"", HashMap::new());
        }
        let mut keys = store.list("b", "a/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a/1", "a/2"]);
        assert_eq!(store.list("b", "").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn injected_failures_cover_listing() {
        let store = MemoryStore::with_bucket("b");
        store.insert_raw("b", "a/1", b"", HashMap::new());
        store.fail_on("a/");
        assert!(matches!(
            store.list("b", "a/").await,
            Err(StoreError::Transport { .. })
        ));
        assert_eq!(store.list("b", "").await.unwrap(), vec!["a/1"]);
    }

    #[tokio::test]
    async fn delayed_keys_wait_before_answering() {
        let store = MemoryStore::with_bucket("b");
        store.delay_on("slow", Duration::from_millis(200));
        let slow = tokio::time::timeout(Duration::from_millis(20), store.head("b", "slow")).await;
        assert!(slow.is_err());
        let fast = tokio::time::timeout(Duration::from_millis(200), store.head("b", "fast")).await;
        assert!(fast.is_ok());
    }
}
