//! Configuration types for bulk runs, job tracking and resumable batches.
//!
//! Every config has sensible defaults, `with_*` setters, and a
//! `validate()` that rejects values the pipeline cannot run with.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

const HOUR: Duration = Duration::from_secs(60 * 60);

/// Options for one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOptions {
    /// Treat every symbol as stale and refetch.
    ///
    /// Default: false.
    pub invalidate_cache: bool,

    /// Concurrent metadata lookups.
    ///
    /// Default: 10.
    pub metadata_concurrency: usize,

    /// Symbols per chunk.
    ///
    /// Default: 10.
    pub chunk_size: usize,

    /// Chunks processed concurrently.
    ///
    /// Default: 1.
    pub chunk_concurrency: usize,

    /// Age after which a cached entry is stale.
    ///
    /// Default: 20 hours.
    pub data_ttl: Duration,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            invalidate_cache: false,
            metadata_concurrency: 10,
            chunk_size: 10,
            chunk_concurrency: 1,
            data_ttl: 20 * HOUR,
        }
    }
}

impl BulkOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invalidate_cache(mut self, invalidate: bool) -> Self {
        self.invalidate_cache = invalidate;
        self
    }

    pub fn with_metadata_concurrency(mut self, concurrency: usize) -> Self {
        self.metadata_concurrency = concurrency;
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_chunk_concurrency(mut self, concurrency: usize) -> Self {
        self.chunk_concurrency = concurrency;
        self
    }

    pub fn with_data_ttl(mut self, ttl: Duration) -> Self {
        self.data_ttl = ttl;
        self
    }

    /// Reject zero sizes and concurrencies.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("metadata_concurrency", self.metadata_concurrency)?;
        non_zero("chunk_size", self.chunk_size)?;
        non_zero("chunk_concurrency", self.chunk_concurrency)?;
        if self.data_ttl.is_zero() {
            return Err(ConfigError::Zero { field: "data_ttl" });
        }
        Ok(())
    }
}

/// Limits for the async job tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Most symbols a single job may carry. Default: 20.
    pub max_stocks_per_job: usize,

    /// Store TTL of a job record. Default: 1 hour.
    pub job_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_stocks_per_job: 20,
            job_ttl: HOUR,
        }
    }
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_stocks_per_job(mut self, max: usize) -> Self {
        self.max_stocks_per_job = max;
        self
    }

    pub fn with_job_ttl(mut self, ttl: Duration) -> Self {
        self.job_ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("max_stocks_per_job", self.max_stocks_per_job)?;
        if self.job_ttl.is_zero() {
            return Err(ConfigError::Zero { field: "job_ttl" });
        }
        Ok(())
    }
}

/// Settings for the resumable batch runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumableConfig {
    /// Symbols processed per tick. Default: 50.
    pub chunk_size: usize,

    /// How long a completed cycle is left alone. Default: 24 hours.
    pub cooldown: Duration,

    /// Options passed to the orchestrator for each tick's chunk.
    pub bulk: BulkOptions,
}

impl Default for ResumableConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            cooldown: 24 * HOUR,
            bulk: BulkOptions::default(),
        }
    }
}

impl ResumableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_bulk(mut self, bulk: BulkOptions) -> Self {
        self.bulk = bulk;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("chunk_size", self.chunk_size)?;
        self.bulk.validate()
    }
}

/// Store-level TTLs applied when writing cache namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTtls {
    /// TTL for `results` entries. Default: 24 hours.
    pub results: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self { results: 24 * HOUR }
    }
}

impl CacheTtls {
    pub fn with_results(mut self, ttl: Duration) -> Self {
        self.results = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.results.is_zero() {
            return Err(ConfigError::Zero { field: "results_ttl" });
        }
        Ok(())
    }
}

fn non_zero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { field });
    }
    Ok(())
}
