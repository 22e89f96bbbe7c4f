/*!
 * Runtime Configuration
 *
 * Explicit configuration value handed to every component at construction.
 * Processor count, verifier checks and pool sizing live here instead of in
 * process-wide globals.
 *
 * Environment variables (see [`IoConfig::from_env`]):
 * - IOCORE_WORKERS: worker pool threads (default: processor count)
 * - IOCORE_VERIFY: enable verifier checks, "1" or "true" (default: false)
 * - IOCORE_SPIN_LIMIT: spins before yielding (default: 100)
 */

use super::errors::{IoError, IoResult};
use super::limits::{
    DEFAULT_HIGH_WATERMARK, DEFAULT_MAX_HELD, DEFAULT_WORKER_THREADS, MAX_WORKER_THREADS,
};
use super::sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remove lock construction options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveLockOptions {
    /// Record (tag, acquired_at) for every outstanding token
    pub track_tags: bool,
    /// Outstanding references above this are logged (0 = disabled)
    pub high_watermark: usize,
    /// Tracked holders older than this are reported as stale
    pub max_held: Duration,
}

impl Default for RemoveLockOptions {
    fn default() -> Self {
        Self {
            track_tags: false,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            max_held: DEFAULT_MAX_HELD,
        }
    }
}

impl RemoveLockOptions {
    pub fn tracked() -> Self {
        Self {
            track_tags: true,
            ..Self::default()
        }
    }

    pub fn with_high_watermark(mut self, high_watermark: usize) -> Self {
        self.high_watermark = high_watermark;
        self
    }

    pub fn with_max_held(mut self, max_held: Duration) -> Self {
        self.max_held = max_held;
        self
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Logical processors available to the host
    pub processor_count: usize,
    /// Threads in the deferred-work pool
    pub worker_threads: usize,
    /// Extra runtime checks (forces remove lock tag tracking)
    pub verifier: bool,
    /// Spin/backoff tuning
    pub sync: SyncConfig,
    /// Defaults for remove locks created through the context
    pub remove_lock: RemoveLockOptions,
    /// Prefix for threads spawned by the dispatcher
    pub thread_name_prefix: String,
}

impl Default for IoConfig {
    fn default() -> Self {
        let processor_count = detect_processor_count();
        Self {
            processor_count,
            worker_threads: processor_count,
            verifier: false,
            sync: SyncConfig::default(),
            remove_lock: RemoveLockOptions::default(),
            thread_name_prefix: "iocore".to_string(),
        }
    }
}

impl IoConfig {
    /// Load from `IOCORE_*` environment variables on top of defaults
    pub fn from_env() -> IoResult<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("IOCORE_WORKERS") {
            config.worker_threads = value.parse().map_err(|_| {
                IoError::InvalidConfig(format!("IOCORE_WORKERS is not a number: {}", value))
            })?;
        }

        if let Ok(value) = std::env::var("IOCORE_VERIFY") {
            config.verifier = value == "1" || value.eq_ignore_ascii_case("true");
        }

        if let Ok(value) = std::env::var("IOCORE_SPIN_LIMIT") {
            config.sync.spin_limit = value.parse().map_err(|_| {
                IoError::InvalidConfig(format!("IOCORE_SPIN_LIMIT is not a number: {}", value))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration document (missing fields take defaults)
    pub fn from_json(json: &str) -> IoResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| IoError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_verifier(mut self, verifier: bool) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_remove_lock(mut self, options: RemoveLockOptions) -> Self {
        self.remove_lock = options;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn validate(&self) -> IoResult<()> {
        if self.worker_threads == 0 || self.worker_threads > MAX_WORKER_THREADS {
            return Err(IoError::InvalidConfig(format!(
                "worker_threads must be between 1 and {}, got {}",
                MAX_WORKER_THREADS, self.worker_threads
            )));
        }
        if self.processor_count == 0 {
            return Err(IoError::InvalidConfig(
                "processor_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Remove lock options after applying verifier overrides
    pub fn effective_remove_lock_options(&self) -> RemoveLockOptions {
        if self.verifier {
            RemoveLockOptions {
                track_tags: true,
                ..self.remove_lock
            }
        } else {
            self.remove_lock
        }
    }
}

fn detect_processor_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_WORKER_THREADS)
        .min(MAX_WORKER_THREADS)
}
