#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mvn_sync_core::maven::MavenMetadata;
use mvn_sync_core::memory::MemoryStore;
use mvn_sync_core::storage;
use mvn_sync_core::{EngineConfig, IgnoreSet, Product, PublishRequest, Publisher, Target};

pub const BUCKET: &str = "maven";
pub const HTTPCLIENT: &str = "org/apache/httpcomponents/httpclient";
pub const LOGGING_JAR: &str = "commons-logging/commons-logging/1.2/commons-logging-1.2.jar";

/// Relative path and content of every file in a product tree.
pub type Tree = Vec<(String, Vec<u8>)>;

/// httpclient at `version` plus commons-logging 1.2, whose bytes are the
/// same for every httpclient version.
pub fn httpclient_tree(version: &str) -> Tree {
    let mut tree = Vec::new();
    for ext in ["jar", "pom"] {
        let name = format!("{HTTPCLIENT}/{version}/httpclient-{version}.{ext}");
        let body = format!("httpclient {version} {ext}").into_bytes();
        tree.push((format!("{name}.sha1"), format!("sha1 of {name}").into_bytes()));
        tree.push((name, body));
    }
    for ext in ["jar", "pom"] {
        let name = format!("commons-logging/commons-logging/1.2/commons-logging-1.2.{ext}");
        tree.push((format!("{name}.sha1"), format!("sha1 of {name}").into_bytes()));
        tree.push((name, format!("commons-logging 1.2 {ext}").into_bytes()));
    }
    tree
}

/// Writes `tree` below `root` and returns the absolute file paths.
pub fn write_tree(root: &Path, tree: &Tree) -> Vec<PathBuf> {
    tree.iter()
        .map(|(relative, content)| {
            let path = root.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

pub fn product(key: &str) -> Product {
    Product::new(key).expect("valid product key")
}

pub fn request(root: &Path, files: Vec<PathBuf>, product_key: &str, target: Target) -> PublishRequest {
    PublishRequest {
        root: root.to_path_buf(),
        files,
        product: product(product_key),
        ignore: IgnoreSet::empty(),
        targets: vec![target],
    }
}

pub fn root_target() -> Target {
    Target::new(BUCKET, "")
}

pub fn publisher(store: Arc<MemoryStore>) -> Publisher<MemoryStore> {
    Publisher::new(
        store,
        EngineConfig {
            concurrency: 4,
            operation_timeout: Duration::from_secs(5),
        },
    )
}

pub async fn tags_of(store: &MemoryStore, key: &str) -> String {
    storage::read_tags(store, BUCKET, key)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{key} should exist"))
        .products
        .to_string()
}

pub fn text_of(store: &MemoryStore, key: &str) -> String {
    let object = store
        .object(BUCKET, key)
        .unwrap_or_else(|| panic!("{key} should exist"));
    String::from_utf8(object.data).unwrap()
}

pub fn metadata_of(store: &MemoryStore, key: &str) -> MavenMetadata {
    MavenMetadata::parse(key, text_of(store, key).as_bytes()).unwrap()
}

pub fn versions_of(doc: &MavenMetadata) -> Vec<&str> {
    doc.versions.iter().map(|v| v.as_str()).collect()
}
