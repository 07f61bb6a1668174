//! Typed errors for the insights library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Per-unit failures ([`FetchError`], [`MetadataError`]) are converted into
//! structured results by the pipeline. Only [`InsightError`] escapes a
//! pipeline run, and it means the run itself could not proceed.

use thiserror::Error;
use uuid::Uuid;

/// Errors that abort a pipeline run, a job, or a tracker/runner call.
#[derive(Debug, Error)]
pub enum InsightError {
    /// Cache backend failed during control flow (partitioning, state I/O)
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration rejected by validation
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Index membership could not be fetched
    #[error("index source error: {0}")]
    IndexSource(#[source] FetchError),

    /// Unexpected failure while assembling or running a batch
    #[error("orchestration failed: {0}")]
    Orchestration(String),

    /// Job record is absent or was already consumed by a terminal read
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// Caller supplied unusable input
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

/// Errors raised by a [`crate::traits::store::CacheStore`] backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend I/O failed (connection, protocol)
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Stored value could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the fetch+parse collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Request exceeded its timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Transport-level failure
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },

    /// Non-success response status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Target element or attribute missing from the page
    #[error("target not found: {0}")]
    NotFound(String),

    /// Target located but its value could not be parsed; raw value attached
    #[error("parse failure: {message}")]
    Parse { message: String, raw: String },
}

impl FetchError {
    /// Raw payload attached to a parse failure.
    pub fn raw(&self) -> Option<&str> {
        match self {
            FetchError::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Whether this failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

/// Why a symbol could not be resolved to its identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The source page carried no usable pk/slug
    #[error("missing data-stock-pk or data-stockslugname")]
    MissingMetadata,

    /// The input was empty after normalization
    #[error("empty symbol")]
    EmptySymbol,

    /// The source page could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Configuration validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value that must be at least 1 was zero
    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    /// An environment-provided value could not be interpreted
    #[error("invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, InsightError>;

/// Result type alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result type alias for collaborator fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
