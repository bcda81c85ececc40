#![doc = "mvn-sync-core: reconciliation engine behind mvn-sync."]

//! Publishes locally extracted Maven repository trees into a shared object
//! store where many products contribute overlapping files. The engine keeps
//! per-object product attribution, `maven-metadata.xml` documents and
//! directory `index.html` pages consistent as products come and go, and
//! refuses to overwrite bytes two products disagree about.
//!
//! # Usage
//! Build a [`publish::Publisher`] around any [`contract::RemoteStore`] and
//! hand it a [`publish::PublishRequest`]. [`memory::MemoryStore`] is a complete
//! in-process store for tests and dry runs.

pub mod checksum;
pub mod config;
pub mod contract;
pub mod error;
pub mod index;
pub mod ledger;
pub mod locks;
pub mod maven;
pub mod memory;
pub mod publish;
pub mod storage;

pub use config::EngineConfig;
pub use contract::{Product, RemoteStore, TagSet, Target};
pub use error::{FailureKind, PublishError, SyncError};
pub use publish::{BatchReport, IgnoreSet, PublishRequest, Publisher};
