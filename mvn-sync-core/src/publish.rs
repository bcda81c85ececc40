//! Batch orchestration: publish or retract a set of local files for one
//! product against one or more targets.
//!
//! # Flow per file and target
//! 1. relative path below the request root (outside the root fails the path)
//! 2. ignore patterns, metadata sidecars and local files named like generated
//!    documents (`index.html`, `.prodinfo`) are skipped and counted
//! 3. the ledger decides create / tag / conflict (or shrink / delete)
//! 4. the coordinate's `maven-metadata.xml` is reconciled for Maven paths
//! 5. ancestor `index.html` pages are reconciled
//! 6. the top-level folder's `.prodinfo` is recorded or pruned
//!
//! Each stage runs under its own key lock and is bounded by
//! [`EngineConfig::operation_timeout`]. A failing path is recorded in the
//! [`BatchReport`] and never stops its siblings; only an unreachable store
//! aborts the batch up front.
//!
//! A retraction ends with a finalize pass over everything it touched: metadata
//! documents lose versions with no objects behind them (and disappear once
//! empty), index pages and `.prodinfo` lists drop the product where no object
//! carries it any more.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::checksum::read_with_checksum;
use crate::config::EngineConfig;
use crate::contract::{Product, RemoteStore, TagSet, Target};
use crate::error::{PublishError, StoreError, SyncError};
use crate::index::{ancestors, IndexReconciler};
use crate::ledger::{Ledger, PublishOutcome, RetractOutcome};
use crate::locks::KeyLocks;
use crate::maven::{
    classify, enclosing_coordinate, Coordinate, MavenMetadata, MavenPath, MavenVersion, MetadataChange,
    MetadataReconciler,
};
use crate::storage;

/// Regular expressions excluding root-relative paths from a batch.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<Regex>,
}

impl IgnoreSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Each pattern has to match the whole `/`-separated relative path.
    pub fn new<I, P>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(&format!("^(?:{})$", p.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_ignored(&self, relative: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(relative))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub root: PathBuf,
    /// Local files, each expected below `root`.
    pub files: Vec<PathBuf>,
    pub product: Product,
    pub ignore: IgnoreSet,
    pub targets: Vec<Target>,
}

/// A local path that could not be published or retracted.
#[derive(Debug)]
pub struct FailedPath {
    pub path: PathBuf,
    /// `None` when the path failed before any target was tried.
    pub target: Option<Target>,
    pub error: SyncError,
}

/// A derived document the finalize pass could not update.
#[derive(Debug)]
pub struct DerivedFailure {
    pub target: Target,
    pub key: String,
    pub error: SyncError,
}

/// Outcome counters of a batch, one count per file and target.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub uploaded: usize,
    pub tagged: usize,
    pub unchanged: usize,
    /// Metadata fragments merged into coordinate documents.
    pub merged: usize,
    pub retracted: usize,
    pub deleted: usize,
    pub untouched: usize,
    pub ignored: usize,
    pub failed: Vec<FailedPath>,
    pub derived_failures: Vec<DerivedFailure>,
}

impl BatchReport {
    /// Distinct local paths with at least one failure, sorted.
    pub fn failed_paths(&self) -> Vec<&Path> {
        let paths: BTreeSet<&Path> = self.failed.iter().map(|f| f.path.as_path()).collect();
        paths.into_iter().collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.derived_failures.is_empty()
    }

    fn absorb(&mut self, other: BatchReport) {
        self.uploaded += other.uploaded;
        self.tagged += other.tagged;
        self.unchanged += other.unchanged;
        self.merged += other.merged;
        self.retracted += other.retracted;
        self.deleted += other.deleted;
        self.untouched += other.untouched;
        self.ignored += other.ignored;
        self.failed.extend(other.failed);
        self.derived_failures.extend(other.derived_failures);
    }

    fn fail(&mut self, path: &Path, target: Option<&Target>, error: SyncError) {
        warn!(
            path = %path.display(),
            target = ?target.map(ToString::to_string),
            kind = ?error.kind(),
            error = %error,
            "[PUBLISH] path failed"
        );
        self.failed.push(FailedPath {
            path: path.to_path_buf(),
            target: target.cloned(),
            error,
        });
    }
}

/// Derived documents a retraction touched, released in the finalize pass.
#[derive(Default)]
struct Touched {
    coordinates: HashSet<(Target, Coordinate)>,
    dirs: HashSet<(Target, String)>,
    tops: HashSet<(Target, String)>,
}

impl Touched {
    fn extend(&mut self, other: Touched) {
        self.coordinates.extend(other.coordinates);
        self.dirs.extend(other.dirs);
        self.tops.extend(other.tops);
    }
}

enum Published {
    Ledger(PublishOutcome),
    Merged,
}

enum Retracted {
    Ledger(RetractOutcome),
    Fragment,
}

pub struct Publisher<S: RemoteStore + ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
    ledger: Ledger,
    metadata: MetadataReconciler,
    index: IndexReconciler,
}

impl<S: RemoteStore + ?Sized> Publisher<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let locks = Arc::new(KeyLocks::new());
        Self {
            store,
            config,
            ledger: Ledger::new(locks.clone()),
            metadata: MetadataReconciler::new(locks.clone()),
            index: IndexReconciler::new(locks),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Products that still claim at least one object of `target`.
    pub async fn live_products(&self, target: &Target) -> Result<TagSet, StoreError> {
        let prefix = target.key_for("");
        storage::products_in(self.store.as_ref(), &target.bucket, &prefix).await
    }

    pub async fn publish(&self, request: &PublishRequest) -> Result<BatchReport, PublishError> {
        self.preflight(request).await?;
        info!(
            product = %request.product,
            files = request.files.len(),
            targets = request.targets.len(),
            root = %request.root.display(),
            "[PUBLISH] starting batch"
        );

        let reports: Vec<BatchReport> = stream::iter(request.files.iter())
            .map(|file| self.publish_file(request, file))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for partial in reports {
            report.absorb(partial);
        }
        info!(
            product = %request.product,
            uploaded = report.uploaded,
            tagged = report.tagged,
            unchanged = report.unchanged,
            merged = report.merged,
            ignored = report.ignored,
            failed = report.failed.len(),
            "[PUBLISH] batch finished"
        );
        Ok(report)
    }

    pub async fn retract(&self, request: &PublishRequest) -> Result<BatchReport, PublishError> {
        self.preflight(request).await?;
        info!(
            product = %request.product,
            files = request.files.len(),
            targets = request.targets.len(),
            "[RETRACT] starting batch"
        );

        let results: Vec<(BatchReport, Touched)> = stream::iter(request.files.iter())
            .map(|file| self.retract_file(request, file))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        let mut touched = Touched::default();
        for (partial, derived) in results {
            report.absorb(partial);
            touched.extend(derived);
        }
        self.finalize(&request.product, touched, &mut report).await;

        info!(
            product = %request.product,
            retracted = report.retracted,
            deleted = report.deleted,
            untouched = report.untouched,
            ignored = report.ignored,
            failed = report.failed.len(),
            derived_failures = report.derived_failures.len(),
            "[RETRACT] batch finished"
        );
        Ok(report)
    }

    async fn preflight(&self, request: &PublishRequest) -> Result<(), PublishError> {
        if request.targets.is_empty() {
            return Err(PublishError::InvalidRequest("no targets given".to_string()));
        }
        if self.config.concurrency == 0 {
            return Err(PublishError::InvalidRequest("concurrency must be at least 1".to_string()));
        }
        for target in &request.targets {
            let reachable = tokio::time::timeout(
                self.config.operation_timeout,
                self.store.check_bucket(&target.bucket),
            )
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::Timeout {
                    bucket: target.bucket.clone(),
                    key: String::new(),
                })
            });
            if let Err(e) = reachable {
                error!(target = %target, error = %e, "[PUBLISH] store unavailable, aborting batch");
                return Err(PublishError::StoreUnavailable(e));
            }
        }
        Ok(())
    }

    async fn timed<T, E, F>(&self, stage: &'static str, key: &str, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, E>>,
        SyncError: From<E>,
    {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout {
                stage,
                key: key.to_string(),
            }),
        }
    }

    async fn publish_file(&self, request: &PublishRequest, file: &Path) -> BatchReport {
        let mut report = BatchReport::default();
        let relative = match relative_path(&request.root, file) {
            Ok(relative) => relative,
            Err(e) => {
                report.fail(file, None, e);
                return report;
            }
        };
        let kind = classify(&relative);
        if skipped(request, &relative, &kind) {
            debug!(path = %relative, "[PUBLISH] ignored");
            report.ignored += 1;
            return report;
        }

        let (data, checksum) = match read_with_checksum(file).await {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                report.fail(file, None, SyncError::MissingSource(file.to_path_buf()));
                return report;
            }
            Err(source) => {
                let error = SyncError::Io {
                    path: file.to_path_buf(),
                    source,
                };
                report.fail(file, None, error);
                return report;
            }
        };

        for target in &request.targets {
            let result = self
                .publish_to(target, &relative, &kind, &data, &checksum, &request.product)
                .await;
            match result {
                Ok(Published::Ledger(PublishOutcome::Created)) => report.uploaded += 1,
                Ok(Published::Ledger(PublishOutcome::Tagged)) => report.tagged += 1,
                Ok(Published::Ledger(PublishOutcome::Unchanged)) => report.unchanged += 1,
                Ok(Published::Merged) => report.merged += 1,
                Err(e) => report.fail(file, Some(target), e),
            }
        }
        report
    }

    async fn publish_to(
        &self,
        target: &Target,
        relative: &str,
        kind: &MavenPath,
        data: &[u8],
        checksum: &str,
        product: &Product,
    ) -> Result<Published, SyncError> {
        let store = self.store.as_ref();
        let key = target.key_for(relative);

        let published = match kind {
            MavenPath::Metadata { coordinate } => {
                let fragment = MavenMetadata::parse(relative, data)?;
                if fragment.versions.is_empty() {
                    debug!(key = %key, "[PUBLISH] metadata fragment lists no versions");
                    return Ok(Published::Merged);
                }
                self.timed(
                    "metadata",
                    &key,
                    self.metadata.publish(store, target, coordinate, &fragment.versions, product),
                )
                .await?;
                Published::Merged
            }
            _ => {
                let outcome = self
                    .timed(
                        "ledger",
                        &key,
                        self.ledger.publish(store, &target.bucket, &key, data, checksum, product),
                    )
                    .await?;
                if let MavenPath::Artifact {
                    coordinate,
                    version,
                } = kind
                {
                    let versions = BTreeSet::from([MavenVersion::new(version.as_str())]);
                    let meta_path = coordinate.metadata_path();
                    self.timed(
                        "metadata",
                        &key,
                        self.metadata.publish(store, target, coordinate, &versions, product),
                    )
                    .await?;
                    self.timed(
                        "index",
                        &key,
                        self.index.publish(store, target, &meta_path, product),
                    )
                    .await?;
                }
                Published::Ledger(outcome)
            }
        };

        self.timed("index", &key, self.index.publish(store, target, relative, product))
            .await?;
        if let Some(top) = top_folder(relative) {
            self.timed(
                "product-info",
                &key,
                self.ledger.record_product_info(store, target, top, product),
            )
            .await?;
        }
        Ok(published)
    }

    async fn retract_file(&self, request: &PublishRequest, file: &Path) -> (BatchReport, Touched) {
        let mut report = BatchReport::default();
        let mut touched = Touched::default();
        let relative = match relative_path(&request.root, file) {
            Ok(relative) => relative,
            Err(e) => {
                report.fail(file, None, e);
                return (report, touched);
            }
        };
        let kind = classify(&relative);
        if skipped(request, &relative, &kind) {
            debug!(path = %relative, "[RETRACT] ignored");
            report.ignored += 1;
            return (report, touched);
        }

        for target in &request.targets {
            match self.retract_from(target, &relative, &kind, &request.product).await {
                Ok(retracted) => {
                    match retracted {
                        Retracted::Ledger(RetractOutcome::Shrunk) => report.retracted += 1,
                        Retracted::Ledger(RetractOutcome::Deleted) => report.deleted += 1,
                        Retracted::Ledger(RetractOutcome::Untouched) | Retracted::Fragment => {
                            report.untouched += 1
                        }
                    }
                    let coordinate = match &kind {
                        MavenPath::Metadata { coordinate } => Some(coordinate.clone()),
                        _ => enclosing_coordinate(&relative),
                    };
                    if let Some(coordinate) = coordinate {
                        for level in ancestors(&coordinate.metadata_path()) {
                            touched.dirs.insert((target.clone(), level.dir));
                        }
                        touched.coordinates.insert((target.clone(), coordinate));
                    }
                    for level in ancestors(&relative) {
                        touched.dirs.insert((target.clone(), level.dir));
                    }
                    if let Some(top) = top_folder(&relative) {
                        touched.tops.insert((target.clone(), top.to_string()));
                    }
                }
                Err(e) => report.fail(file, Some(target), e),
            }
        }
        (report, touched)
    }

    async fn retract_from(
        &self,
        target: &Target,
        relative: &str,
        kind: &MavenPath,
        product: &Product,
    ) -> Result<Retracted, SyncError> {
        let store = self.store.as_ref();
        let key = target.key_for(relative);

        // fragments were merged, never stored under their own tags
        if matches!(kind, MavenPath::Metadata { .. }) {
            return Ok(Retracted::Fragment);
        }

        let outcome = self
            .timed(
                "ledger",
                &key,
                self.ledger.retract(store, &target.bucket, &key, product),
            )
            .await?;
        if !outcome.changed() {
            return Ok(Retracted::Ledger(outcome));
        }

        if let MavenPath::Artifact {
            coordinate,
            version,
        } = kind
        {
            let change = self
                .timed(
                    "metadata",
                    &key,
                    self.metadata.retract_version(store, target, coordinate, version),
                )
                .await?;
            if change == MetadataChange::Deleted {
                self.timed(
                    "index",
                    &key,
                    self.index.retract(store, target, &coordinate.metadata_path()),
                )
                .await?;
            }
        }
        self.timed("index", &key, self.index.retract(store, target, relative))
            .await?;
        if let Some(top) = top_folder(relative) {
            self.timed(
                "product-info",
                &key,
                self.ledger.prune_product_info(store, target, top),
            )
            .await?;
        }
        Ok(Retracted::Ledger(outcome))
    }

    /// Settles the derived documents a retraction touched, in dependency
    /// order: coordinate metadata (dropping versions with nothing behind them,
    /// removing documents nobody backs), then index pages, then the
    /// `.prodinfo` lists of the top-level folders.
    async fn finalize(&self, product: &Product, touched: Touched, report: &mut BatchReport) {
        let store = self.store.as_ref();

        let failures: Vec<DerivedFailure> = stream::iter(touched.coordinates.into_iter())
            .map(|(target, coordinate)| async move {
                let meta_path = coordinate.metadata_path();
                let key = target.key_for(&meta_path);
                let released = self
                    .timed(
                        "finalize-metadata",
                        &key,
                        self.metadata.release_product(store, &target, &coordinate, product),
                    )
                    .await;
                let result = match released {
                    Ok(MetadataChange::Deleted) => self
                        .timed(
                            "finalize-index",
                            &key,
                            self.index.retract(store, &target, &meta_path),
                        )
                        .await
                        .map(|_| ()),
                    Ok(_) => Ok(()),
                    Err(e) => Err(e),
                };
                result.err().map(|error| DerivedFailure { target, key, error })
            })
            .buffer_unordered(self.config.concurrency)
            .filter_map(|failure| async move { failure })
            .collect()
            .await;
        report.derived_failures.extend(failures);

        let failures: Vec<DerivedFailure> = stream::iter(touched.dirs.into_iter())
            .map(|(target, dir)| async move {
                let key = target.key_for(&format!("{dir}{}", storage::INDEX_NAME));
                self.timed(
                    "finalize-index",
                    &key,
                    self.index.prune_product(store, &target, &dir, product),
                )
                .await
                .err()
                .map(|error| DerivedFailure { target, key, error })
            })
            .buffer_unordered(self.config.concurrency)
            .filter_map(|failure| async move { failure })
            .collect()
            .await;
        report.derived_failures.extend(failures);

        let failures: Vec<DerivedFailure> = stream::iter(touched.tops.into_iter())
            .map(|(target, top)| async move {
                let key = target.key_for(&format!("{top}/{}", storage::PROD_INFO_NAME));
                self.timed(
                    "finalize-product-info",
                    &key,
                    self.ledger.release_product_info(store, &target, &top, product),
                )
                .await
                .err()
                .map(|error| DerivedFailure { target, key, error })
            })
            .buffer_unordered(self.config.concurrency)
            .filter_map(|failure| async move { failure })
            .collect()
            .await;
        report.derived_failures.extend(failures);

        for failure in &report.derived_failures {
            warn!(target = %failure.target, key = %failure.key, error = %failure.error, "[RETRACT] finalize failed");
        }
    }
}

/// Ignored by pattern, a metadata sidecar, or a name the engine writes itself.
fn skipped(request: &PublishRequest, relative: &str, kind: &MavenPath) -> bool {
    request.ignore.is_ignored(relative)
        || *kind == MavenPath::MetadataSidecar
        || storage::is_reserved(relative)
}

/// `/`-joined path of `file` below `root`.
fn relative_path(root: &Path, file: &Path) -> Result<String, SyncError> {
    let outside = || SyncError::OutsideRoot {
        path: file.to_path_buf(),
        root: root.to_path_buf(),
    };
    let rest = file.strip_prefix(root).map_err(|_| outside())?;
    let parts: Vec<String> = rest
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return Err(outside());
    }
    Ok(parts.join("/"))
}

fn top_folder(relative: &str) -> Option<&str> {
    relative.split_once('/').map(|(top, _)| top)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_patterns_match_whole_paths() {
        let ignore = IgnoreSet::new([r".*\.sha1"]).unwrap();
        assert!(ignore.is_ignored("a/b/c.jar.sha1"));
        assert!(!ignore.is_ignored("a/b/c.sha1.jar"));
        assert!(!IgnoreSet::empty().is_ignored("a"));
        assert!(IgnoreSet::new(["("]).is_err());
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_path(root, Path::new("/repo/org/foo/1.0/foo-1.0.jar")).unwrap(),
            "org/foo/1.0/foo-1.0.jar"
        );
        assert!(matches!(
            relative_path(root, Path::new("/other/x.jar")),
            Err(SyncError::OutsideRoot { .. })
        ));
        assert!(relative_path(root, root).is_err());
    }

    #[test]
    fn top_folder_is_first_segment() {
        assert_eq!(top_folder("org/foo/x.jar"), Some("org"));
        assert_eq!(top_folder("README"), None);
    }
}
