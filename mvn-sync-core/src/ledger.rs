//! # ledger: product attribution for remote objects
//!
//! The ledger owns every decision over an object's tag set:
//!
//! - publish: create, union the product in, or reject on content conflict
//! - retract: shrink the tag set, deleting the object once nobody claims it
//!
//! It also maintains the per-top-level-folder `.prodinfo` product list.
//! Each read-decide-write sequence runs under the object's key lock; the
//! remote store is always re-read inside the lock, never cached.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::checksum::sha256_hex;
use crate::contract::{ObjectTags, Product, RemoteStore, TagSet, Target};
use crate::error::{LedgerError, StoreError};
use crate::locks::KeyLocks;
use crate::storage::{self, PROD_INFO_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The object did not exist and was uploaded.
    Created,
    /// Same content already present; the product was added to its tag set.
    Tagged,
    /// Same content already present and already claimed by the product.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetractOutcome {
    /// Object absent or not claimed by the product.
    Untouched,
    /// Product removed, other products still claim the object.
    Shrunk,
    /// Product was the last claimant; the object is gone.
    Deleted,
}

impl RetractOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, RetractOutcome::Untouched)
    }
}

pub struct Ledger {
    locks: Arc<KeyLocks>,
}

impl Ledger {
    pub fn new(locks: Arc<KeyLocks>) -> Self {
        Self { locks }
    }

    pub async fn publish<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        bucket: &str,
        key: &str,
        data: &[u8],
        checksum: &str,
        product: &Product,
    ) -> Result<PublishOutcome, LedgerError> {
        let _guard = self.locks.lock(format!("obj:{bucket}/{key}")).await;

        let Some(mut tags) = storage::read_tags(store, bucket, key).await? else {
            let tags = ObjectTags {
                checksum: Some(checksum.to_string()),
                products: TagSet::single(product),
            };
            storage::put_tagged(store, bucket, key, data, &tags).await?;
            debug!(bucket, key, %product, "[LEDGER] created");
            return Ok(PublishOutcome::Created);
        };

        let remote_checksum = match &tags.checksum {
            Some(c) => c.clone(),
            // written by something other than this engine: hash what is there
            None => sha256_hex(&store.get(bucket, key).await?),
        };

        if remote_checksum != checksum {
            warn!(
                bucket,
                key,
                %product,
                local = checksum,
                remote = %remote_checksum,
                owners = %tags.products,
                "[LEDGER] content conflict, leaving remote object untouched"
            );
            return Err(LedgerError::ContentConflict {
                key: key.to_string(),
                local: checksum.to_string(),
                remote: remote_checksum,
                owners: tags.products.to_string(),
            });
        }

        let adopted = tags.checksum.is_none();
        tags.checksum = Some(remote_checksum);
        if !tags.products.insert(product.clone()) && !adopted {
            debug!(bucket, key, %product, "[LEDGER] unchanged");
            return Ok(PublishOutcome::Unchanged);
        }
        storage::put_tagged(store, bucket, key, data, &tags).await?;
        debug!(bucket, key, products = %tags.products, "[LEDGER] tagged");
        Ok(PublishOutcome::Tagged)
    }

    pub async fn retract<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        bucket: &str,
        key: &str,
        product: &Product,
    ) -> Result<RetractOutcome, LedgerError> {
        let _guard = self.locks.lock(format!("obj:{bucket}/{key}")).await;

        let Some(mut tags) = storage::read_tags(store, bucket, key).await? else {
            return Ok(RetractOutcome::Untouched);
        };
        if !tags.products.remove(product) {
            debug!(bucket, key, %product, owners = %tags.products, "[LEDGER] not claimed by product");
            return Ok(RetractOutcome::Untouched);
        }

        if tags.products.is_empty() {
            storage::delete(store, bucket, key).await?;
            debug!(bucket, key, %product, "[LEDGER] deleted");
            return Ok(RetractOutcome::Deleted);
        }

        let content = store.get(bucket, key).await?;
        storage::put_tagged(store, bucket, key, &content, &tags).await?;
        debug!(bucket, key, products = %tags.products, "[LEDGER] shrunk");
        Ok(RetractOutcome::Shrunk)
    }

    /// Adds `product` to the `.prodinfo` list of a top-level folder.
    /// Returns true when the list was rewritten.
    pub async fn record_product_info<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        top: &str,
        product: &Product,
    ) -> Result<bool, StoreError> {
        let key = target.key_for(&format!("{top}/{PROD_INFO_NAME}"));
        let _guard = self.locks.lock(format!("prodinfo:{}/{key}", target.bucket)).await;

        let mut products: BTreeSet<String> = match store.head(&target.bucket, &key).await? {
            Some(_) => parse_product_info(&store.get(&target.bucket, &key).await?),
            None => BTreeSet::new(),
        };
        if !products.insert(product.as_str().to_string()) {
            return Ok(false);
        }

        write_product_info(store, &target.bucket, &key, &products).await?;
        info!(bucket = %target.bucket, key = %key, %product, "[LEDGER] recorded product info");
        Ok(true)
    }

    /// Deletes the `.prodinfo` object of a folder that no longer holds content.
    /// Returns true when it was removed.
    pub async fn prune_product_info<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        top: &str,
    ) -> Result<bool, StoreError> {
        let key = target.key_for(&format!("{top}/{PROD_INFO_NAME}"));
        let _guard = self.locks.lock(format!("prodinfo:{}/{key}", target.bucket)).await;

        let folder = target.key_for(&format!("{top}/"));
        if storage::has_real_objects(store, &target.bucket, &folder).await? {
            return Ok(false);
        }
        if !storage::exists(store, &target.bucket, &key).await? {
            return Ok(false);
        }
        storage::delete(store, &target.bucket, &key).await?;
        info!(bucket = %target.bucket, key = %key, "[LEDGER] removed product info of empty folder");
        Ok(true)
    }

    /// Drops `product` from a folder's `.prodinfo` list once no object in the
    /// folder carries it any more; deletes the list when the folder is empty.
    /// Returns true when the list was rewritten or removed.
    pub async fn release_product_info<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        top: &str,
        product: &Product,
    ) -> Result<bool, StoreError> {
        let key = target.key_for(&format!("{top}/{PROD_INFO_NAME}"));
        let _guard = self.locks.lock(format!("prodinfo:{}/{key}", target.bucket)).await;

        if store.head(&target.bucket, &key).await?.is_none() {
            return Ok(false);
        }
        let folder = target.key_for(&format!("{top}/"));
        if !storage::has_real_objects(store, &target.bucket, &folder).await? {
            storage::delete(store, &target.bucket, &key).await?;
            info!(bucket = %target.bucket, key = %key, "[LEDGER] removed product info of empty folder");
            return Ok(true);
        }
        let mut products = parse_product_info(&store.get(&target.bucket, &key).await?);
        if !products.contains(product.as_str())
            || storage::claimed_under(store, &target.bucket, &folder, product, None).await?
        {
            return Ok(false);
        }
        products.remove(product.as_str());

        if products.is_empty() {
            storage::delete(store, &target.bucket, &key).await?;
            info!(bucket = %target.bucket, key = %key, %product, "[LEDGER] last product left folder, product info removed");
            return Ok(true);
        }
        write_product_info(store, &target.bucket, &key, &products).await?;
        info!(bucket = %target.bucket, key = %key, %product, "[LEDGER] product info shrunk");
        Ok(true)
    }
}

async fn write_product_info<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    key: &str,
    products: &BTreeSet<String>,
) -> Result<(), StoreError> {
    let content = render_product_info(products);
    let tags = ObjectTags {
        checksum: Some(sha256_hex(content.as_bytes())),
        products: products.iter().filter_map(|p| Product::new(p.as_str())).collect(),
    };
    storage::put_tagged(store, bucket, key, content.as_bytes(), &tags).await
}

pub fn parse_product_info(content: &[u8]) -> BTreeSet<String> {
    String::from_utf8_lossy(content)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn render_product_info(products: &BTreeSet<String>) -> String {
    let mut out = String::new();
    for p in products {
        out.push_str(p);
        out.push('\n');
    }
    out
}
