//! Directory listing pages (`index.html`) kept in step with the objects
//! below them.
//!
//! Every directory from a file's parent up to the target root has one page.
//! Publishing makes sure each level lists the next one down; retracting
//! removes entries that no longer have anything real beneath them and
//! deletes pages that end up empty. The ancestor chain is walked with a
//! plain loop, each level under its own lock.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use quick_xml::escape::{escape, unescape};
use regex::Regex;
use tracing::{debug, info};

use crate::checksum::sha256_hex;
use crate::contract::{ObjectTags, Product, RemoteStore, TagSet, Target};
use crate::error::IndexError;
use crate::locks::KeyLocks;
use crate::storage::{self, INDEX_NAME};

const PARENT_ENTRY: &str = "../";

/// One level of an ancestor walk: a directory relative to the target root
/// (`""` for the root, otherwise with a trailing `/`) and the child entry
/// inside it that leads to the published path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Level {
    pub dir: String,
    pub child: String,
}

/// Levels from the file's parent directory up to the target root.
pub fn ancestors(relative: &str) -> Vec<Level> {
    let mut levels = Vec::new();
    let mut rest = relative.trim_matches('/');
    let mut child_is_dir = false;
    while !rest.is_empty() {
        let (dir, name) = match rest.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", rest),
        };
        levels.push(Level {
            dir: if dir.is_empty() {
                String::new()
            } else {
                format!("{dir}/")
            },
            child: if child_is_dir {
                format!("{name}/")
            } else {
                name.to_string()
            },
        });
        rest = dir;
        child_is_dir = true;
    }
    levels
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    /// Directory relative to the target root, `""` for the root.
    pub dir: String,
    pub entries: BTreeSet<String>,
}

fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<a\s+href="([^"]*)""#).expect("anchor pattern is valid")
    })
}

impl IndexDocument {
    pub fn new(dir: &str) -> Self {
        Self {
            dir: dir.to_string(),
            entries: BTreeSet::new(),
        }
    }

    /// Reads the entries back from a rendered page.
    pub fn parse(dir: &str, html: &str) -> Self {
        let entries = anchor_pattern()
            .captures_iter(html)
            .filter_map(|c| c.get(1))
            .map(|m| {
                unescape(m.as_str())
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| m.as_str().to_string())
            })
            .filter(|name| {
                name != PARENT_ENTRY && !name.is_empty() && !storage::is_reserved(name)
            })
            .collect();
        Self {
            dir: dir.to_string(),
            entries,
        }
    }

    pub fn is_root(&self) -> bool {
        self.dir.is_empty()
    }

    pub fn render(&self) -> String {
        let title = if self.is_root() {
            "/".to_string()
        } else {
            self.dir.clone()
        };
        let title = escape(title.as_str());
        let mut out = format!(
            "<!DOCTYPE html>\n<html>\n<head><title>Index of {title}</title></head>\n<body>\n<h1>Index of {title}</h1>\n<ul style=\"list-style: none outside;\" id=\"contents\">\n"
        );
        let dirs = self.entries.iter().filter(|e| e.ends_with('/'));
        let files = self.entries.iter().filter(|e| !e.ends_with('/'));
        let parent = (!self.is_root()).then_some(PARENT_ENTRY);
        for entry in parent.into_iter().chain(dirs.map(String::as_str)).chain(files.map(String::as_str)) {
            let name = escape(entry);
            out.push_str(&format!("<li><a href=\"{name}\" title=\"{name}\">{name}</a></li>\n"));
        }
        out.push_str("</ul>\n</body>\n</html>\n");
        out
    }
}

pub struct IndexReconciler {
    locks: Arc<KeyLocks>,
}

struct Page {
    document: IndexDocument,
    tags: TagSet,
    exists: bool,
}

impl IndexReconciler {
    pub fn new(locks: Arc<KeyLocks>) -> Self {
        Self { locks }
    }

    fn index_key(target: &Target, dir: &str) -> String {
        target.key_for(&format!("{dir}{INDEX_NAME}"))
    }

    async fn load<S: RemoteStore + ?Sized>(
        store: &S,
        bucket: &str,
        key: &str,
        dir: &str,
    ) -> Result<Page, IndexError> {
        let Some(tags) = storage::read_tags(store, bucket, key).await? else {
            return Ok(Page {
                document: IndexDocument::new(dir),
                tags: TagSet::new(),
                exists: false,
            });
        };
        let html = store.get(bucket, key).await?;
        Ok(Page {
            document: IndexDocument::parse(dir, &String::from_utf8_lossy(&html)),
            tags: tags.products,
            exists: true,
        })
    }

    async fn write<S: RemoteStore + ?Sized>(
        store: &S,
        bucket: &str,
        key: &str,
        document: &IndexDocument,
        products: TagSet,
    ) -> Result<(), IndexError> {
        let html = document.render();
        let tags = ObjectTags {
            checksum: Some(sha256_hex(html.as_bytes())),
            products,
        };
        storage::put_tagged(store, bucket, key, html.as_bytes(), &tags).await?;
        Ok(())
    }

    /// Makes every ancestor page list the path and claims the pages for
    /// `product`. Returns the number of pages written.
    pub async fn publish<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        relative: &str,
        product: &Product,
    ) -> Result<usize, IndexError> {
        let bucket = target.bucket.as_str();
        let mut written = 0;
        for level in ancestors(relative) {
            let key = Self::index_key(target, &level.dir);
            let _guard = self.locks.lock(format!("index:{bucket}/{key}")).await;

            let mut page = Self::load(store, bucket, &key, &level.dir).await?;
            let added = page.document.entries.insert(level.child.clone());
            let claimed = page.tags.insert(product.clone());
            if page.exists && !added && !claimed {
                continue;
            }
            Self::write(store, bucket, &key, &page.document, page.tags).await?;
            debug!(bucket, key = %key, entry = %level.child, "[INDEX] updated");
            written += 1;
        }
        Ok(written)
    }

    /// Walks up from the path's parent, dropping entries with nothing real
    /// left under them. Stops at the first level that still has content.
    /// Returns the number of pages rewritten or deleted.
    pub async fn retract<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        relative: &str,
    ) -> Result<usize, IndexError> {
        let bucket = target.bucket.as_str();
        let mut changed = 0;
        for level in ancestors(relative) {
            let key = Self::index_key(target, &level.dir);
            let _guard = self.locks.lock(format!("index:{bucket}/{key}")).await;

            let child_key = target.key_for(&format!("{}{}", level.dir, level.child));
            if storage::has_real_objects(store, bucket, &child_key).await? {
                break;
            }

            let mut page = Self::load(store, bucket, &key, &level.dir).await?;
            let removed = page.document.entries.remove(&level.child);
            let dir_key = target.key_for(&level.dir);
            if storage::has_real_objects(store, bucket, &dir_key).await? {
                if page.exists && removed {
                    Self::write(store, bucket, &key, &page.document, page.tags).await?;
                    debug!(bucket, key = %key, entry = %level.child, "[INDEX] entry removed");
                    changed += 1;
                }
                break;
            }
            if page.exists {
                storage::delete(store, bucket, &key).await?;
                info!(bucket, key = %key, "[INDEX] empty directory page removed");
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Removes `product` from a page's tag set when it no longer claims any
    /// object below the directory.
    pub async fn prune_product<S: RemoteStore + ?Sized>(
        &self,
        store: &S,
        target: &Target,
        dir: &str,
        product: &Product,
    ) -> Result<bool, IndexError> {
        let bucket = target.bucket.as_str();
        let key = Self::index_key(target, dir);
        let _guard = self.locks.lock(format!("index:{bucket}/{key}")).await;

        let Some(mut tags) = storage::read_tags(store, bucket, &key).await? else {
            return Ok(false);
        };
        if !tags.products.contains(product) {
            return Ok(false);
        }
        let dir_key = target.key_for(dir);
        if storage::claimed_under(store, bucket, &dir_key, product, None).await? {
            return Ok(false);
        }
        tags.products.remove(product);
        let html = store.get(bucket, &key).await?;
        storage::put_tagged(store, bucket, &key, &html, &tags).await?;
        debug!(bucket, key = %key, %product, "[INDEX] product released");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn ancestors_run_from_parent_to_root() {
        let levels = ancestors("org/apache/foo-1.0.jar");
        let pairs: Vec<(&str, &str)> = levels
            .iter()
            .map(|l| (l.dir.as_str(), l.child.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("org/apache/", "foo-1.0.jar"),
                ("org/", "apache/"),
                ("", "org/"),
            ]
        );
        assert_eq!(ancestors("README"), vec![Level { dir: "".into(), child: "README".into() }]);
    }

    #[test]
    fn render_orders_parent_dirs_then_files() {
        let mut doc = IndexDocument::new("org/apache/");
        for entry in ["b.txt", "zeta/", "a.txt", "alpha/"] {
            doc.entries.insert(entry.to_string());
        }
        let html = doc.render();
        let order: Vec<usize> = ["../", "alpha/", "zeta/", "a.txt", "b.txt"]
            .iter()
            .map(|e| html.find(&format!("href=\"{e}\"")).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert!(html.contains("<title>Index of org/apache/</title>"));
        assert_eq!(IndexDocument::parse("org/apache/", &html), doc);
    }

    #[test]
    fn root_page_has_no_parent_link() {
        let mut doc = IndexDocument::new("");
        doc.entries.insert("org/".into());
        let html = doc.render();
        assert!(!html.contains("../"));
        assert!(html.contains("Index of /"));
    }

    #[test]
    fn parse_skips_reserved_names() {
        let html = r#"<li><a href="../">../</a></li><li><a href="index.html">x</a></li><li><a href="x.jar">x.jar</a></li>"#;
        let doc = IndexDocument::parse("a/", html);
        assert_eq!(doc.entries.into_iter().collect::<Vec<_>>(), vec!["x.jar"]);
    }

    #[tokio::test]
    async fn publish_then_retract_under_prefix() {
        let store = MemoryStore::with_bucket("b");
        let index = IndexReconciler::new(Arc::new(KeyLocks::new()));
        let target = Target::new("b", "ga");
        let p = Product::new("p-1").unwrap();
        let file = "org/foo/1.0/foo-1.0.jar";

        store.insert_raw("b", &target.key_for(file), b"jar", Default::default());
        assert_eq!(index.publish(&store, &target, file, &p).await.unwrap(), 4);
        assert_eq!(index.publish(&store, &target, file, &p).await.unwrap(), 0);
        assert_eq!(
            store.keys("b"),
            vec![
                "ga/index.html",
                "ga/org/foo/1.0/foo-1.0.jar",
                "ga/org/foo/1.0/index.html",
                "ga/org/foo/index.html",
                "ga/org/index.html",
            ]
        );
        let root = String::from_utf8(store.object("b", "ga/index.html").unwrap().data).unwrap();
        assert!(root.contains("href=\"org/\""));

        store.delete("b", "ga/org/foo/1.0/foo-1.0.jar").await.unwrap();
        assert_eq!(index.retract(&store, &target, file).await.unwrap(), 4);
        assert!(store.keys("b").is_empty());
    }

    #[tokio::test]
    async fn retract_stops_at_backed_levels() {
        let store = MemoryStore::with_bucket("b");
        let index = IndexReconciler::new(Arc::new(KeyLocks::new()));
        let target = Target::new("b", "");
        let p = Product::new("p-1").unwrap();
        for file in ["org/a/1.0/a-1.0.jar", "org/a/2.0/a-2.0.jar"] {
            store.insert_raw("b", file, b"jar", Default::default());
            index.publish(&store, &target, file, &p).await.unwrap();
        }

        store.delete("b", "org/a/1.0/a-1.0.jar").await.unwrap();
        assert_eq!(index.retract(&store, &target, "org/a/1.0/a-1.0.jar").await.unwrap(), 2);
        let page = String::from_utf8(store.object("b", "org/a/index.html").unwrap().data).unwrap();
        assert!(!page.contains("1.0/"));
        assert!(page.contains("2.0/"));
        assert!(store.object("b", "org/index.html").is_some());
    }
}
