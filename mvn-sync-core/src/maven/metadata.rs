//! `maven-metadata.xml` documents and their reconciliation against the store.
//!
//! A coordinate document is the union of every version published under it.
//! The document is recomputed from the remote copy inside the coordinate lock
//! on every change; nothing is cached between calls.

use std::collections::BTreeSet;
use std::sync::Arc;

use quick_xml::escape::escape;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::checksum::sha256_hex;
use crate::contract::{ObjectTags, Product, RemoteStore, TagSet, Target};
use crate::error::MetadataError;
use crate::locks::KeyLocks;
use crate::maven::coordinate::Coordinate;
use crate::maven::version::MavenVersion;
use crate::storage;

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(rename = "groupId", default)]
    group_id: Option<String>,
    #[serde(rename = "artifactId", default)]
    artifact_id: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    versioning: Option<RawVersioning>,
}

#[derive(Debug, Deserialize)]
struct RawVersioning {
    #[serde(default)]
    versions: Option<RawVersions>,
    #[serde(rename = "lastUpdated", default)]
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVersions {
    #[serde(default)]
    version: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenMetadata {
    pub group_id: String,
    pub artifact_id: String,
    pub versions: BTreeSet<MavenVersion>,
    pub last_updated: Option<String>,
}

impl MavenMetadata {
    pub fn new(coordinate: &Coordinate) -> Self {
        Self {
            group_id: coordinate.group_id.clone(),
            artifact_id: coordinate.artifact_id.clone(),
            versions: BTreeSet::new(),
            last_updated: None,
        }
    }

    /// Parses a document. `latest`/`release` are not read back, they are
    /// always recomputed from the version list. A top-level `<version>`
    /// (as found in some fragments) counts as one more version.
    pub fn parse(key: &str, content: &[u8]) -> Result<Self, MetadataError> {
        let malformed = |reason: String| MetadataError::Malformed {
            key: key.to_string(),
            reason,
        };
        let text = std::str::from_utf8(content).map_err(|e| malformed(e.to_string()))?;
        let raw: RawMetadata = quick_xml::de::from_str(text).map_err(|e| malformed(e.to_string()))?;

        let mut versions = BTreeSet::new();
        let mut last_updated = None;
        if let Some(versioning) = raw.versioning {
            last_updated = versioning.last_updated.map(|s| s.trim().to_string());
            if let Some(list) = versioning.versions {
                versions.extend(
                    list.version
                        .iter()
                        .map(|v| v.trim())
                        .filter(|v| !v.is_empty())
                        .map(MavenVersion::new),
                );
            }
        }
        if let Some(v) = raw.version.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            versions.insert(MavenVersion::new(v));
        }

        Ok(Self {
            group_id: raw.group_id.unwrap_or_default().trim().to_string(),
            artifact_id: raw.artifact_id.unwrap_or_default().trim().to_string(),
            versions,
            last_updated,
        })
    }

    pub fn latest(&self) -> Option<&MavenVersion> {
        self.versions.iter().next_back()
    }

    /// Highest version that is not a snapshot.
    pub fn release(&self) -> Option<&MavenVersion> {
        self.versions.iter().rev().find(|v| !v.is_snapshot())
    }

    /// Equality ignoring `lastUpdated`.
    pub fn same_content(&self, other: &MavenMetadata) -> bool {
        self.group_id == other.group_id
            && self.artifact_id == other.artifact_id
            && self.versions == other.versions
    }

    pub fn touch(&mut self) {
        self.last_updated = Some(chrono::Utc::now().format("%Y%m%d%H%M%S").to_string());
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata>\n");
        out.push_str(&format!("  <groupId>{}</groupId>\n", escape(self.group_id.as_str())));
        out.push_str(&format!(
            "  <artifactId>{}</artifactId>\n",
            escape(self.artifact_id.as_str())
        ));
        out.push_str("  <versioning>\n");
        if let Some(latest) = self.latest() {
            out.push_str(&format!("    <latest>{}</latest>\n", escape(latest.as_str())));
        }
        if let Some(release) = self.release() {
            out.push_str(&format!("    <release>{}</release>\n", escape(release.as_str())));
        }
        out.push_str("    <versions>\n");
        for version in &self.versions {
            out.push_str(&format!("      <version>{}</version>\n", escape(version.as_str())));
        }
        out.push_str("    </versions>\n");
        if let Some(stamp) = &self.last_updated {
            out.push_str(&format!("    <lastUpdated>{}</lastUpdated>\n", escape(stamp.as_str())));
        }
        out.push_str("  </versioning>\n</metadata>\n");
        out
    }
}

/// What a retraction did to a coordinate document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataChange {
    Unchanged,
    Rewritten,
    /// The last version went away, and the document with it.
    Deleted,
}

pub struct MetadataReconciler {
    locks: Arc<KeyLocks>,
}

struct Current {
    document: MavenMetadata,
    tags: TagSet,
    exists: bool,
}

impl MetadataReconciler {
    pub fn new(locks: Arc<KeyLocks>) -> Self {
        Self { locks }
    }

    async fn load<S: RemoteStore + ?Sized>(
        store: &S,
        bucket: &str,
        key: &str,
        coordinate: &Coordinate,
    ) -> Result<Current, MetadataError> {
        let Some(tags) = storage::read_tags(store, bucket, key).await? else {
            return Ok(Current {
                document: MavenMetadata::new(coordinate),
                tags: TagSet::new(),
                exists: false,
            });
        };
        let content = store.get(bucket, key).await?;
        let document = MavenMetadata::parse(key, &content).inspect_err(|e| {
            warn!(bucket, key, error = %e, "[META] remote document does not parse, leaving it untouched");
        })?;
        Ok(Current {
            document,
            tags: tags.products,
            exists: true,
        })
    }

    async fn store_document<S: RemoteStore + ?Sized>(
        store: &S,
        bucket: &str,
        key: &str,
        document: &MavenMetadata,
        products: TagSet,
    ) -> Result<(), MetadataError> {
        let xml = document.to_xml();
        let tags = ObjectTags {
            checksum: Some(sha256_hex(xml.as_bytes())),
            products,
        };
        storage::put_tagged(store, bucket, key, xml.as_bytes(), &tags).await?;
        Ok(())
    }

    /// Merges `versions` into the coordinate document and claims it for
    /// `product`. Returns true when the document was written.
    pub async fn publish<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        coordinate: &Coordinate,
        versions: &BTreeSet<MavenVersion>,
        product: &Product,
    ) -> Result<bool, MetadataError> {
        let bucket = target.bucket.as_str();
        let key = target.key_for(&coordinate.metadata_path());
        let _guard = self.locks.lock(format!("meta:{bucket}/{key}")).await;

        let current = Self::load(store, bucket, &key, coordinate).await?;
        if !current.exists && versions.is_empty() {
            return Ok(false);
        }

        let mut document = current.document.clone();
        document.group_id = coordinate.group_id.clone();
        document.artifact_id = coordinate.artifact_id.clone();
        document.versions.extend(versions.iter().cloned());
        let mut products = current.tags;
        let claimed = products.insert(product.clone());

        let content_changed = !current.exists || !document.same_content(&current.document);
        if !content_changed && !claimed {
            debug!(bucket, key = %key, "[META] unchanged");
            return Ok(false);
        }
        if content_changed {
            document.touch();
        }
        Self::store_document(store, bucket, &key, &document, products).await?;
        info!(
            bucket,
            key = %key,
            latest = ?document.latest().map(MavenVersion::as_str),
            versions = document.versions.len(),
            "[META] merged"
        );
        Ok(true)
    }

    /// Drops `version` from the coordinate document once nothing real is
    /// left under its version directory.
    pub async fn retract_version<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        coordinate: &Coordinate,
        version: &str,
    ) -> Result<MetadataChange, MetadataError> {
        let bucket = target.bucket.as_str();
        let key = target.key_for(&coordinate.metadata_path());
        let _guard = self.locks.lock(format!("meta:{bucket}/{key}")).await;

        let version_dir = target.key_for(&coordinate.version_dir(version));
        if storage::has_real_objects(store, bucket, &version_dir).await? {
            return Ok(MetadataChange::Unchanged);
        }
        let current = Self::load(store, bucket, &key, coordinate).await?;
        if !current.exists {
            return Ok(MetadataChange::Unchanged);
        }

        let mut document = current.document;
        let before = document.versions.len();
        document.versions.retain(|v| v.as_str() != version);
        if document.versions.len() == before {
            return Ok(MetadataChange::Unchanged);
        }

        if document.versions.is_empty() {
            storage::delete(store, bucket, &key).await?;
            info!(bucket, key = %key, version, "[META] last version retracted, document removed");
            return Ok(MetadataChange::Deleted);
        }
        document.touch();
        Self::store_document(store, bucket, &key, &document, current.tags).await?;
        info!(bucket, key = %key, version, "[META] version retracted");
        Ok(MetadataChange::Rewritten)
    }

    /// Settles a coordinate document after `product` retracted files below
    /// it: versions whose directory holds no real object are dropped, and the
    /// product is released once it claims nothing else under the coordinate.
    /// The document is deleted when no version or no claimant is left.
    pub async fn release_product<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        coordinate: &Coordinate,
        product: &Product,
    ) -> Result<MetadataChange, MetadataError> {
        let bucket = target.bucket.as_str();
        let key = target.key_for(&coordinate.metadata_path());
        let _guard = self.locks.lock(format!("meta:{bucket}/{key}")).await;

        let current = Self::load(store, bucket, &key, coordinate).await?;
        if !current.exists {
            return Ok(MetadataChange::Unchanged);
        }

        let mut document = current.document.clone();
        let mut backed = BTreeSet::new();
        for version in &current.document.versions {
            let version_dir = target.key_for(&coordinate.version_dir(version.as_str()));
            if storage::has_real_objects(store, bucket, &version_dir).await? {
                backed.insert(version.clone());
            }
        }
        document.versions = backed;

        let mut tags = current.tags;
        let mut released = false;
        if tags.contains(product) {
            let dir = target.key_for(&format!("{}/", coordinate.dir));
            if !storage::claimed_under(store, bucket, &dir, product, Some(&key)).await? {
                released = tags.remove(product);
            }
        }

        if document.versions.is_empty() || tags.is_empty() {
            storage::delete(store, bucket, &key).await?;
            info!(bucket, key = %key, %product, "[META] nothing left behind the document, removed");
            return Ok(MetadataChange::Deleted);
        }
        let content_changed = !document.same_content(&current.document);
        if !content_changed && !released {
            return Ok(MetadataChange::Unchanged);
        }
        if content_changed {
            document.touch();
        }
        Self::store_document(store, bucket, &key, &document, tags).await?;
        debug!(bucket, key = %key, %product, versions = document.versions.len(), "[META] released");
        Ok(MetadataChange::Rewritten)
    }
}
