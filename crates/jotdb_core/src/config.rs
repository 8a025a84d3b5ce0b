//! Engine configuration.

use crate::error::{EngineError, EngineResult};
use std::sync::Arc;
use std::time::Duration;

/// Hook invoked on asynchronous failures (throttled fsync, background
/// compaction). Synchronous errors propagate from the failing call instead.
pub type ErrorHook = Arc<dyn Fn(&EngineError) + Send + Sync>;

/// Configuration for opening an engine.
#[derive(Clone)]
pub struct Config {
    /// Soft cap on block file size. A block may exceed it by at most one
    /// record. Must be a multiple of 1024 and at least 1024.
    pub max_block_size: u64,

    /// Durability policy. Zero means a file-data sync on every append;
    /// non-zero means a background sync at most once per delay per block.
    pub data_sync_delay: Duration,

    /// Fraction of `max_block_size` a block's stale bytes must reach before
    /// it is eligible for compaction. Zero disables compaction.
    pub stale_data_threshold: f64,

    /// Interval between background compaction sweeps.
    pub compact_delay: Duration,

    /// Field names projected into the in-memory cache on load.
    pub cached_fields: Vec<String>,

    /// Callback for asynchronous flush or compaction failures.
    pub on_error: Option<ErrorHook>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_block_size: 8 * 1024 * 1024,              // 8 MiB
            data_sync_delay: Duration::from_millis(1000),
            stale_data_threshold: 0.1,
            compact_delay: Duration::from_secs(86_400),   // daily
            cached_fields: Vec::new(),
            on_error: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the soft block size cap.
    #[must_use]
    pub const fn max_block_size(mut self, size: u64) -> Self {
        self.max_block_size = size;
        self
    }

    /// Sets the durability delay.
    #[must_use]
    pub const fn data_sync_delay(mut self, delay: Duration) -> Self {
        self.data_sync_delay = delay;
        self
    }

    /// Sets the compaction eligibility threshold.
    #[must_use]
    pub const fn stale_data_threshold(mut self, threshold: f64) -> Self {
        self.stale_data_threshold = threshold;
        self
    }

    /// Sets the compaction sweep interval.
    #[must_use]
    pub const fn compact_delay(mut self, delay: Duration) -> Self {
        self.compact_delay = delay;
        self
    }

    /// Sets the fields projected into the in-memory cache.
    #[must_use]
    pub fn cached_fields(mut self, fields: Vec<String>) -> Self {
        self.cached_fields = fields;
        self
    }

    /// Sets the asynchronous error hook.
    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EngineError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Validates option values. Called by `Engine::open`.
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_block_size < 1024 || self.max_block_size % 1024 != 0 {
            return Err(EngineError::invalid_option(format!(
                "max_block_size must be a multiple of 1024 and at least 1024, got {}",
                self.max_block_size
            )));
        }
        if !(0.0..=1.0).contains(&self.stale_data_threshold) {
            return Err(EngineError::invalid_option(format!(
                "stale_data_threshold must be within [0, 1], got {}",
                self.stale_data_threshold
            )));
        }
        if self.compact_delay.is_zero() {
            return Err(EngineError::invalid_option(
                "compact_delay must be non-zero",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("max_block_size", &self.max_block_size)
            .field("data_sync_delay", &self.data_sync_delay)
            .field("stale_data_threshold", &self.stale_data_threshold)
            .field("compact_delay", &self.compact_delay)
            .field("cached_fields", &self.cached_fields)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
