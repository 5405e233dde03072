use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum queue items processed together in one batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Items pulled from the queue per batch.
    pub batch_size: usize,
    /// Attempts per item within one cycle before it is dropped.
    pub retry_attempts: u32,
    /// Base backoff; attempt `n` waits `n * retry_delay_ms`.
    pub retry_delay_ms: u64,
    /// Upper bound on any single remote call (ms).
    pub request_timeout_ms: u64,
    /// Periodic sync interval while online (ms).
    pub sync_interval_ms: u64,
    /// Re-enqueue budget of the priority queue's own failure path.
    pub queue_max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            request_timeout_ms: 30_000,
            sync_interval_ms: 5 * 60 * 1_000,
            queue_max_retries: 3,
        }
    }
}

impl SyncConfig {
    /// Defaults with `CARELINK_SYNC_*` environment overrides applied.
    pub fn from_env() -> SyncResult<Self> {
        let mut config = Self::default();
        override_from_env("CARELINK_SYNC_BATCH_SIZE", &mut config.batch_size)?;
        override_from_env("CARELINK_SYNC_RETRY_ATTEMPTS", &mut config.retry_attempts)?;
        override_from_env("CARELINK_SYNC_RETRY_DELAY_MS", &mut config.retry_delay_ms)?;
        override_from_env("CARELINK_SYNC_TIMEOUT_MS", &mut config.request_timeout_ms)?;
        override_from_env("CARELINK_SYNC_INTERVAL_MS", &mut config.sync_interval_ms)?;
        if config.batch_size == 0 {
            return Err(SyncError::Config("batch size must be at least 1".into()));
        }
        Ok(config)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

fn override_from_env<T>(name: &str, slot: &mut T) -> SyncResult<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        *slot = raw
            .parse()
            .map_err(|e| SyncError::Config(format!("{name}={raw}: {e}")))?;
    }
    Ok(())
}
