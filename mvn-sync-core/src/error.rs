//! Error types for the reconciliation engine.
//!
//! Per-path failures (`SyncError`) are collected into a batch report and never
//! abort sibling files. Only [`PublishError`] is batch-fatal.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single call against the remote store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("transport error on {bucket}/{key}: {message}")]
    Transport {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("operation on {bucket}/{key} timed out")]
    Timeout { bucket: String, key: String },

    #[error("bucket {bucket} is unavailable: {message}")]
    Unavailable { bucket: String, message: String },
}

impl StoreError {
    pub fn transport(bucket: &str, key: &str, message: impl Into<String>) -> Self {
        StoreError::Transport {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(bucket: &str, key: &str) -> Self {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Two products claim different bytes at the same remote path.
    #[error("content conflict at {key}: local checksum {local} differs from remote {remote} (owned by {owners})")]
    ContentConflict {
        key: String,
        local: String,
        remote: String,
        owners: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// The remote document exists but does not parse; it is left untouched.
    #[error("malformed maven metadata at {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Broad classification of a per-path failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ContentConflict,
    Transport,
    MalformedMetadata,
    MissingSource,
    InvalidPath,
}

/// Why a single local path failed to publish or retract.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local source {0} does not exist")]
    MissingSource(PathBuf),

    #[error("{path} is not located under root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} stage timed out for {key}")]
    Timeout { stage: &'static str, key: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl SyncError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::MissingSource(_) => FailureKind::MissingSource,
            SyncError::OutsideRoot { .. } => FailureKind::InvalidPath,
            SyncError::Io { .. } => FailureKind::MissingSource,
            SyncError::Timeout { .. } => FailureKind::Transport,
            SyncError::Store(_) => FailureKind::Transport,
            SyncError::Ledger(LedgerError::ContentConflict { .. }) => FailureKind::ContentConflict,
            SyncError::Ledger(LedgerError::Store(_)) => FailureKind::Transport,
            SyncError::Metadata(MetadataError::Malformed { .. }) => FailureKind::MalformedMetadata,
            SyncError::Metadata(MetadataError::Store(_)) => FailureKind::Transport,
            SyncError::Index(_) => FailureKind::Transport,
        }
    }
}

/// Conditions that prevent a batch from running at all.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("remote store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
