//! Bulk Insight Extraction
//!
//! Fetches per-symbol "insight" fragments for many instruments at once,
//! without redundant network work and without losing progress to partial
//! failure.
//!
//! # Design
//!
//! - One injected [`CacheStore`] backs every namespace (metadata, results,
//!   jobs, batch state); no globals
//! - Work is fanned out through a bounded pool ([`pool::run_bounded`])
//! - Per-unit failures are data; only control-flow failures are errors
//! - Jobs have a single writer, so concurrent completions never lose updates
//!
//! # Usage
//!
//! ```rust,ignore
//! use insights::{BatchOrchestrator, BulkOptions, MemoryStore};
//! use insights::fetchers::HttpInsightSource;
//!
//! let cache = Arc::new(MemoryStore::new());
//! let source = Arc::new(HttpInsightSource::new()?);
//! let orchestrator = BatchOrchestrator::new(cache, source.clone(), source);
//!
//! let outcome = orchestrator.run(&["TCS", "INFY"], &BulkOptions::default()).await?;
//! println!("{} fetched, {} cached", outcome.fetched_count, outcome.cached_count);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Cache store and collaborator abstractions
//! - [`types`] - Symbols, descriptors, results, job and batch records, config
//! - [`stores`] - Cache backends (MemoryStore, RedisStore)
//! - [`pool`] - Bounded-concurrency execution
//! - [`resolver`] - Cached symbol metadata resolution
//! - [`requests`] - Insight templates and descriptor building
//! - [`orchestrator`] - The bulk pipeline
//! - [`jobs`] - Pollable asynchronous jobs
//! - [`resumable`] - Chunked progress across scheduled ticks
//! - [`maintenance`] - Cache admin and index rebuilds
//! - [`fetchers`] - HTTP/HTML and index API collaborators
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod fetchers;
pub mod jobs;
pub mod maintenance;
pub mod orchestrator;
pub mod pool;
pub mod requests;
pub mod resolver;
pub mod resumable;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{CacheError, ConfigError, FetchError, InsightError, MetadataError, Result};
pub use jobs::{JobHandle, JobMode, JobTracker};
pub use orchestrator::{BatchOrchestrator, BulkOutcome, MetadataFailure, PipelineEvent};
pub use resolver::MetadataResolver;
pub use resumable::{ResumableRunner, TickOutcome};
pub use stores::MemoryStore;
#[cfg(feature = "redis")]
pub use stores::RedisStore;
pub use traits::{
    source::{IndexSource, InsightExtractor, MetadataSource},
    store::{CacheStore, CacheStoreExt, Namespace},
};
pub use types::{
    batch::BatchState,
    config::{BulkOptions, CacheTtls, ResumableConfig, TrackerConfig},
    job::{JobRecord, JobStatus},
    request::{Category, RequestDescriptor, TargetSelector},
    result::{CacheEntry, ExtractedPayload, ExtractionResult, PayloadKind},
    symbol::{Metadata, Symbol},
};
