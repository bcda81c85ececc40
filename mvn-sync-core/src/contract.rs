//! # contract: the remote store seam and the value types that cross it
//!
//! [`RemoteStore`] is the storage-facing primitive of the engine: existence
//! (via `head`), get, list-by-prefix, put-with-metadata and delete. It makes no
//! merge decisions. Implementations:
//!
//! - [`crate::memory::MemoryStore`] - in-process store used by tests and dry runs
//! - the S3 client in the `mvn-sync` binary crate
//! - `MockRemoteStore`, generated by `mockall` under the `test-export-mocks` feature
//!
//! Product attribution is modelled here as real values ([`Product`], [`TagSet`]);
//! the comma-joined string form only exists inside [`crate::storage`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::StoreError;

/// A logical publisher identity, usually `name-version`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Product(String);

impl Product {
    /// Returns `None` for keys that cannot survive the metadata encoding.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let key = key.trim().to_string();
        if key.is_empty() || key.contains(',') || key.contains('\n') {
            return None;
        }
        Some(Product(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of products currently claiming a remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeSet<Product>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(product: &Product) -> Self {
        let mut set = Self::new();
        set.insert(product.clone());
        set
    }

    /// Returns true when the product was not yet present.
    pub fn insert(&mut self, product: Product) -> bool {
        self.0.insert(product)
    }

    /// Returns true when the product was present.
    pub fn remove(&mut self, product: &Product) -> bool {
        self.0.remove(product)
    }

    pub fn contains(&self, product: &Product) -> bool {
        self.0.contains(product)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.0.iter()
    }
}

impl FromIterator<Product> for TagSet {
    fn from_iter<I: IntoIterator<Item = Product>>(iter: I) -> Self {
        TagSet(iter.into_iter().collect())
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(Product::as_str).collect();
        f.write_str(&joined.join(","))
    }
}

/// Checksum and product attribution stored alongside each object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectTags {
    pub checksum: Option<String>,
    pub products: TagSet,
}

/// Result of a HEAD on a remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
    /// User-defined string metadata, keys without any transport prefix.
    pub metadata: HashMap<String, String>,
}

/// Where a batch is published: a bucket and a key prefix inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub bucket: String,
    pub prefix: String,
}

impl Target {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Target {
            bucket: bucket.into(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Joins a repository-relative path onto the prefix.
    pub fn key_for(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if self.prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.prefix, relative)
        }
    }

    /// Strips the prefix from a key, if the key lives under it.
    pub fn relative<'k>(&self, key: &'k str) -> Option<&'k str> {
        if self.prefix.is_empty() {
            return Some(key);
        }
        key.strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.bucket)
        } else {
            write!(f, "{}/{}", self.bucket, self.prefix)
        }
    }
}

/// Low-level object store operations, implemented by each backend.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fails when the bucket cannot be reached at all.
    async fn check_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Returns `None` when the object does not exist.
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, StoreError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// All keys starting with `prefix`, in no particular order.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<(), StoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_rejects_separator_characters() {
        assert!(Product::new("a,b").is_none());
        assert!(Product::new("a\nb").is_none());
        assert!(Product::new("  ").is_none());
        assert_eq!(Product::new(" commons-1.0 ").unwrap().as_str(), "commons-1.0");
    }

    #[test]
    fn tag_set_displays_sorted_and_deduplicated() {
        let mut tags = TagSet::new();
        assert!(tags.insert(Product::new("b-1").unwrap()));
        assert!(tags.insert(Product::new("a-1").unwrap()));
        assert!(!tags.insert(Product::new("b-1").unwrap()));
        assert_eq!(tags.to_string(), "a-1,b-1");
    }

    #[test]
    fn target_joins_and_strips_prefix() {
        let target = Target::new("bucket", "/ga/");
        assert_eq!(target.key_for("org/foo.jar"), "ga/org/foo.jar");
        assert_eq!(target.relative("ga/org/foo.jar"), Some("org/foo.jar"));
        assert_eq!(target.relative("gax/org/foo.jar"), None);

        let root = Target::new("bucket", "");
        assert_eq!(root.key_for("/org/foo.jar"), "org/foo.jar");
        assert_eq!(root.relative("org/foo.jar"), Some("org/foo.jar"));
    }
}
