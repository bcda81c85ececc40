use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Tuning knobs of the publish engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Files processed at the same time.
    pub concurrency: usize,
    /// Upper bound for each stage (ledger, metadata, index, product info)
    /// of a single file.
    pub operation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn trace_loaded(&self) {
        info!(
            concurrency = self.concurrency,
            operation_timeout_secs = self.operation_timeout.as_secs(),
            "Loaded EngineConfig"
        );
        debug!(?self, "EngineConfig loaded (full debug)");
    }
}
