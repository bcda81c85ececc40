//! Remote object accessor helpers built on [`RemoteStore`].
//!
//! This is the only module that knows how checksums and tag sets are encoded
//! into per-object string metadata. Everything above it works on
//! [`ObjectTags`]/[`TagSet`] values.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::contract::{ObjectTags, Product, RemoteStore, TagSet};
use crate::error::StoreError;

/// Metadata entry holding the content checksum.
pub const CHECKSUM_META_KEY: &str = "checksum";
/// Metadata entry holding the comma-joined product tag set.
pub const PRODUCT_META_KEY: &str = "products";
/// File name of the per-top-level-folder product list.
pub const PROD_INFO_NAME: &str = ".prodinfo";
/// File name of generated directory listings.
pub const INDEX_NAME: &str = "index.html";

/// Names written by the engine itself; they never count as real content.
pub fn is_reserved(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    name == INDEX_NAME || name == PROD_INFO_NAME
}

pub fn content_type_for(key: &str) -> &'static str {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") => "text/html",
        Some("xml") | Some("pom") => "application/xml",
        Some("jar") | Some("war") | Some("ear") => "application/java-archive",
        Some("sha1") | Some("md5") | Some("sha256") | Some("sha512") | Some("asc") => "text/plain",
        _ if name == PROD_INFO_NAME => "text/plain",
        _ => "application/octet-stream",
    }
}

pub fn encode_tags(tags: &ObjectTags) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    if let Some(checksum) = &tags.checksum {
        metadata.insert(CHECKSUM_META_KEY.to_string(), checksum.clone());
    }
    metadata.insert(PRODUCT_META_KEY.to_string(), tags.products.to_string());
    metadata
}

pub fn decode_tags(metadata: &HashMap<String, String>) -> ObjectTags {
    let checksum = metadata
        .get(CHECKSUM_META_KEY)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let products = metadata
        .get(PRODUCT_META_KEY)
        .map(|raw| raw.split(',').filter_map(Product::new).collect())
        .unwrap_or_default();
    ObjectTags { checksum, products }
}

pub async fn exists<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    key: &str,
) -> Result<bool, StoreError> {
    Ok(store.head(bucket, key).await?.is_some())
}

/// Tags of an existing object, `None` when it does not exist.
pub async fn read_tags<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    key: &str,
) -> Result<Option<ObjectTags>, StoreError> {
    Ok(store
        .head(bucket, key)
        .await?
        .map(|head| decode_tags(&head.metadata)))
}

pub async fn put_tagged<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    key: &str,
    data: &[u8],
    tags: &ObjectTags,
) -> Result<(), StoreError> {
    debug!(bucket, key, products = %tags.products, "[STORE] put");
    store
        .put(bucket, key, data, content_type_for(key), &encode_tags(tags))
        .await
}

pub async fn delete<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    key: &str,
) -> Result<(), StoreError> {
    debug!(bucket, key, "[STORE] delete");
    store.delete(bucket, key).await
}

/// Lists keys under `prefix` that end with `suffix`.
///
/// Listing failures are returned next to the (possibly empty) result instead
/// of aborting, so callers can report and carry on.
pub async fn get_files<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
) -> (Vec<String>, Vec<StoreError>) {
    match store.list(bucket, prefix.unwrap_or("")).await {
        Ok(keys) => {
            let mut files: Vec<String> = keys
                .into_iter()
                .filter(|k| suffix.map_or(true, |s| k.ends_with(s)))
                .collect();
            files.sort();
            (files, Vec::new())
        }
        Err(e) => (Vec::new(), vec![e]),
    }
}

fn folder_prefix(folder: &str) -> String {
    let trimmed = folder.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Immediate children of `folder`: full keys for files, `dir/` keys for
/// sub-directories. `""` or `"/"` is the bucket root.
pub async fn list_folder<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    folder: &str,
) -> Result<BTreeSet<String>, StoreError> {
    let prefix = folder_prefix(folder);
    let keys = store.list(bucket, &prefix).await?;
    let mut children = BTreeSet::new();
    for key in keys {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((dir, _)) => {
                children.insert(format!("{prefix}{dir}/"));
            }
            None if !rest.is_empty() => {
                children.insert(key.clone());
            }
            None => {}
        }
    }
    Ok(children)
}

/// True when at least one non-reserved object lives under `prefix`
/// (the prefix is treated as a directory when it is empty or ends with `/`).
pub async fn has_real_objects<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    prefix: &str,
) -> Result<bool, StoreError> {
    let keys = store.list(bucket, prefix).await?;
    Ok(keys.iter().any(|k| {
        if prefix.is_empty() || prefix.ends_with('/') {
            !is_reserved(k)
        } else {
            // a bare key: only an exact match or something below `key/` counts
            (k == prefix || k.starts_with(&format!("{prefix}/"))) && !is_reserved(k)
        }
    }))
}

/// Derived view of every product still claiming something under `prefix`.
///
/// There is no registry of products; this scan over tag sets is the only
/// source of truth and is deliberately not cached.
pub async fn products_in<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    prefix: &str,
) -> Result<TagSet, StoreError> {
    let mut all = TagSet::new();
    for key in store.list(bucket, prefix).await? {
        if is_reserved(&key) {
            continue;
        }
        if let Some(tags) = read_tags(store, bucket, &key).await? {
            for product in tags.products.iter() {
                all.insert(product.clone());
            }
        }
    }
    Ok(all)
}

/// True when some non-reserved object under `prefix`, other than `except`,
/// is still claimed by `product`. Stops at the first hit.
pub async fn claimed_under<S: RemoteStore + ?Sized>(
    store: &S,
    bucket: &str,
    prefix: &str,
    product: &Product,
    except: Option<&str>,
) -> Result<bool, StoreError> {
    for key in store.list(bucket, prefix).await? {
        if is_reserved(&key) || except == Some(key.as_str()) {
            continue;
        }
        if let Some(tags) = read_tags(store, bucket, &key).await? {
            if tags.products.contains(product) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
