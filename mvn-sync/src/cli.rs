//! Command line surface of mvn-sync.
//!
//! `upload` publishes an extracted Maven repository tree for one product
//! version, `delete` retracts it again and `products` lists the products that
//! still own objects under a prefix. All reconciliation lives in
//! `mvn-sync-core`; this module only resolves configuration, builds the
//! store and prints the batch summary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mvn_sync_core::memory::MemoryStore;
use mvn_sync_core::{BatchReport, IgnoreSet, Product, PublishRequest, Publisher, RemoteStore, Target};

use crate::collect::{canonical_root, collect_files};
use crate::load_config::{load_config, resolve_config_path, CliConfig};
use crate::s3::S3Store;

#[derive(Parser)]
#[clap(
    name = "mvn-sync",
    version,
    about = "Publish and retract Maven repository trees in a shared S3 bucket"
)]
pub struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[clap(long, global = true)]
    pub debug: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish every file of an extracted repository for one product version
    Upload(BatchArgs),
    /// Retract a product version's files, keeping objects other products still own
    Delete(BatchArgs),
    /// List the products that still own objects under a prefix
    Products {
        /// Use the GA prefix instead of the early-access prefix
        #[clap(long)]
        ga: bool,
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Root of the extracted Maven repository
    pub repo: PathBuf,
    /// Product name, e.g. "httpclient"
    #[clap(long)]
    pub product: String,
    /// Product version; the product key is "<product>-<version>"
    #[clap(long = "version")]
    pub product_version: String,
    /// Use the GA prefix instead of the early-access prefix
    #[clap(long)]
    pub ga: bool,
    /// Regular expression matched against whole relative paths; repeatable
    #[clap(long = "ignore")]
    pub ignore: Vec<String>,
    /// Path to the YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Run against an empty in-memory bucket instead of the configured store
    #[clap(long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Publish,
    Retract,
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Upload(args) => run_batch(args, Mode::Publish).await,
        Commands::Delete(args) => run_batch(args, Mode::Retract).await,
        Commands::Products { ga, config } => {
            let config = load_config(resolve_config_path(config)?)?;
            let target = Target::new(config.store.bucket.clone(), config.prefix(ga));
            let store = remote_store(&config)?;
            let publisher = Publisher::new(store, config.engine.clone());
            let live = publisher
                .live_products(&target)
                .await
                .with_context(|| format!("listing products under {target}"))?;
            tracing::info!(command = "products", %target, count = live.len(), "Listed live products");
            for product in live.iter() {
                println!("{product}");
            }
            Ok(())
        }
    }
}

async fn run_batch(args: BatchArgs, mode: Mode) -> Result<()> {
    let config = load_config(resolve_config_path(args.config.clone())?)?;
    config.engine.trace_loaded();

    let key = format!("{}-{}", args.product, args.product_version);
    let product = Product::new(key.clone()).ok_or_else(|| anyhow!("invalid product key {key:?}"))?;
    let ignore = IgnoreSet::new(config.ignore_patterns.iter().chain(args.ignore.iter()))
        .context("invalid ignore pattern")?;
    let target = Target::new(config.store.bucket.clone(), config.prefix(args.ga));

    let root = canonical_root(&args.repo)?;
    let files = collect_files(&root)?;
    tracing::info!(
        command = ?mode,
        product = %product,
        target = %target,
        files = files.len(),
        ignore_patterns = ignore.len(),
        dry_run = args.dry_run,
        "Starting batch"
    );

    let store: Arc<dyn RemoteStore> = if args.dry_run {
        Arc::new(MemoryStore::with_bucket(&config.store.bucket))
    } else {
        remote_store(&config)?
    };
    let publisher = Publisher::new(store, config.engine.clone());
    let request = PublishRequest {
        root,
        files,
        product,
        ignore,
        targets: vec![target],
    };

    let report = match mode {
        Mode::Publish => publisher.publish(&request).await,
        Mode::Retract => publisher.retract(&request).await,
    }
    .map_err(|e| {
        tracing::error!(command = ?mode, error = %e, "Batch aborted");
        anyhow!(e)
    })?;

    print_summary(mode, &request.product, &report);
    if !report.is_success() {
        bail!(
            "{} path(s) and {} derived document(s) failed",
            report.failed_paths().len(),
            report.derived_failures.len()
        );
    }
    tracing::info!(command = ?mode, "Batch complete");
    Ok(())
}

fn remote_store(config: &CliConfig) -> Result<Arc<dyn RemoteStore>> {
    let credentials = config.require_credentials()?.clone();
    let store = S3Store::new(&config.store, credentials, config.engine.operation_timeout)?;
    Ok(Arc::new(store))
}

fn print_summary(mode: Mode, product: &Product, report: &BatchReport) {
    match mode {
        Mode::Publish => println!(
            "upload {product}: {} uploaded, {} tagged, {} unchanged, {} merged, {} ignored, {} failed",
            report.uploaded,
            report.tagged,
            report.unchanged,
            report.merged,
            report.ignored,
            report.failed_paths().len()
        ),
        Mode::Retract => println!(
            "delete {product}: {} deleted, {} retracted, {} untouched, {} ignored, {} failed",
            report.deleted,
            report.retracted,
            report.untouched,
            report.ignored,
            report.failed_paths().len()
        ),
    }
    for failure in &report.failed {
        let target = failure
            .target
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "FAILED {} [{:?}] {target}: {}",
            failure.path.display(),
            failure.error.kind(),
            failure.error
        );
    }
    for failure in &report.derived_failures {
        println!("FAILED derived {} {}: {}", failure.target, failure.key, failure.error);
    }
}
