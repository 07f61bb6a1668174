use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use insights::fetchers::http::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use insights::{BulkOptions, ResumableConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which cache backend the worker owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis,
}

impl FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => bail!("unknown cache backend '{}' (supported: memory, redis)", other),
        }
    }
}

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    pub redis_prefix: String,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub bulk: BulkOptions,
    pub resumable: ResumableConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = BulkOptions::default();

        let bulk = BulkOptions::new()
            .with_metadata_concurrency(parse(&lookup, "METADATA_CONCURRENCY", defaults.metadata_concurrency)?)
            .with_chunk_size(parse(&lookup, "CHUNK_SIZE", defaults.chunk_size)?)
            .with_chunk_concurrency(parse(&lookup, "CHUNK_CONCURRENCY", defaults.chunk_concurrency)?)
            .with_data_ttl(hours(parse(&lookup, "DATA_TTL_HOURS", defaults.data_ttl.as_secs() / 3600)?));
        bulk.validate().context("invalid bulk options")?;

        let resumable_defaults = ResumableConfig::default();
        let resumable = ResumableConfig::new()
            .with_chunk_size(parse(&lookup, "RESUMABLE_CHUNK_SIZE", resumable_defaults.chunk_size)?)
            .with_cooldown(hours(parse(
                &lookup,
                "COOLDOWN_HOURS",
                resumable_defaults.cooldown.as_secs() / 3600,
            )?))
            .with_bulk(bulk.clone());
        resumable.validate().context("invalid resumable options")?;

        let timeout_ms: u64 = parse(&lookup, "REQUEST_TIMEOUT_MS", DEFAULT_TIMEOUT.as_millis() as u64)?;
        if timeout_ms == 0 {
            bail!("REQUEST_TIMEOUT_MS must be at least 1");
        }

        Ok(Self {
            cache_backend: parse(&lookup, "CACHE_BACKEND", CacheBackend::Memory)?,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            redis_prefix: lookup("REDIS_PREFIX").unwrap_or_else(|| "insights".to_string()),
            request_timeout: Duration::from_millis(timeout_ms),
            user_agent: lookup("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            bulk,
            resumable,
        })
    }
}

fn hours(n: u64) -> Duration {
    Duration::from_secs(n * 3600)
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("{} must be valid, got '{}'", key, raw)),
        _ => Ok(default),
    }
}
