//! `load_config`: reads the static YAML configuration and injects secrets
//! from the environment.
//!
//! The YAML file never holds credentials. `AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY` and the optional `AWS_SESSION_TOKEN` are read from
//! the environment (a `.env` file is loaded by the binary first). Missing
//! credentials are not an error here; only commands that talk to the store
//! require them.
//!
//! ```yaml
//! store:
//!   bucket: maven-prod
//!   endpoint: https://s3.us-east-1.amazonaws.com
//!   region: us-east-1
//!   ga_prefix: ga
//!   early_access_prefix: earlyaccess/all
//! engine:
//!   concurrency: 16
//!   operation_timeout_secs: 60
//! ignore_patterns: [".*\\.md5"]
//! ```

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use mvn_sync_core::config::{DEFAULT_CONCURRENCY, DEFAULT_OPERATION_TIMEOUT};
use mvn_sync_core::EngineConfig;
use serde::Deserialize;
use tracing::{error, info};

pub const CONFIG_ENV: &str = "MVN_SYNC_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    pub bucket: String,
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_ga_prefix")]
    pub ga_prefix: String,
    #[serde(default = "default_early_access_prefix")]
    pub early_access_prefix: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_ga_prefix() -> String {
    "ga".to_string()
}

fn default_early_access_prefix() -> String {
    "earlyaccess/all".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSection {
    pub concurrency: Option<usize>,
    pub operation_timeout_secs: Option<u64>,
}

impl From<EngineSection> for EngineConfig {
    fn from(section: EngineSection) -> Self {
        EngineConfig {
            concurrency: section.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            operation_timeout: section
                .operation_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_OPERATION_TIMEOUT),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// `None` unless both the key id and the secret are set.
    pub fn from_env() -> Option<Self> {
        let access_key_id = env::var("AWS_ACCESS_KEY_ID").ok().filter(|v| !v.is_empty())?;
        let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok().filter(|v| !v.is_empty())?;
        let session_token = env::var("AWS_SESSION_TOKEN").ok().filter(|v| !v.is_empty());
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub store: StoreSection,
    pub engine: EngineConfig,
    pub ignore_patterns: Vec<String>,
    pub credentials: Option<Credentials>,
}

impl CliConfig {
    pub fn prefix(&self, ga: bool) -> &str {
        if ga {
            &self.store.ga_prefix
        } else {
            &self.store.early_access_prefix
        }
    }

    pub fn require_credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| anyhow!("AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set"))
    }
}

/// `--config` if given, else `$MVN_SYNC_CONFIG`, else `~/.mvn-sync/config.yaml`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = env::var("HOME").context("no --config given and HOME is not set")?;
    Ok(Path::new(&home).join(".mvn-sync").join("config.yaml"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    #[derive(Debug, Deserialize)]
    struct RawConfig {
        store: StoreSection,
        #[serde(default)]
        engine: EngineSection,
        #[serde(default)]
        ignore_patterns: Vec<String>,
    }

    let raw: RawConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, bucket = %raw.store.bucket, "Parsed config YAML successfully");

    let credentials = Credentials::from_env();
    if credentials.is_none() {
        info!("No AWS credentials in environment, remote commands will refuse to run");
    }

    Ok(CliConfig {
        store: raw.store,
        engine: raw.engine.into(),
        ignore_patterns: raw.ignore_patterns,
        credentials,
    })
}
