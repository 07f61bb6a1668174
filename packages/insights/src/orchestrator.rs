//! Bulk pipeline: partition, resolve, build, chunk, fetch, persist, merge.
//!
//! # Flow
//!
//! ```text
//! symbols ─► normalize/dedupe ─► partition ─┬─► cached (fresh CacheEntry)
//!                                           └─► toFetch ─► resolve (pool) ─► build
//!                                                                            │
//!                                       merge ◄─ persist ◄─ chunks (pool) ◄──┘
//! ```
//!
//! Per-unit failures (missing metadata, fetch and parse errors) become data.
//! Only control-flow failures (invalid options, cache unreachable while
//! partitioning) fail the run.

use chrono::Utc;
use futures::future::join_all;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::{CacheError, InsightError, MetadataError, Result};
use crate::pool::run_bounded;
use crate::requests;
use crate::resolver::MetadataResolver;
use crate::traits::{
    source::{InsightExtractor, MetadataSource},
    store::{CacheStore, CacheStoreExt, Namespace},
};
use crate::types::{
    config::{BulkOptions, CacheTtls},
    request::RequestDescriptor,
    result::{CacheEntry, ExtractionResult},
    symbol::Symbol,
};

/// Progress notification emitted once per symbol as it settles.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Served from a fresh cache entry
    Cached {
        symbol: Symbol,
        results: Vec<ExtractionResult>,
    },

    /// Fetched in a chunk that has finished
    Fetched {
        symbol: Symbol,
        results: Vec<ExtractionResult>,
    },

    /// Metadata could not be resolved; the symbol is dropped from the run
    MetadataFailed { symbol: Symbol, error: MetadataError },
}

/// A symbol that never reached the fetch stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataFailure {
    /// Input as given (normalized when possible)
    pub symbol: String,

    #[serde(serialize_with = "serialize_display")]
    pub error: MetadataError,
}

fn serialize_display<S: Serializer>(error: &MetadataError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    /// Cached and freshly fetched results, keyed by symbol
    pub results: BTreeMap<Symbol, Vec<ExtractionResult>>,

    pub metadata_errors: Vec<MetadataFailure>,

    /// Raw input count, before normalization and de-duplication.
    ///
    /// Always `processed_symbols + metadata_errors.len() + duplicate_symbols`.
    pub total_symbols: usize,

    /// Inputs dropped because they normalize to an earlier symbol
    pub duplicate_symbols: usize,

    /// Symbols present in `results`
    pub processed_symbols: usize,

    pub cached_count: usize,
    pub fetched_count: usize,
}

type Resolved = (Symbol, Vec<RequestDescriptor>);

/// Runs the bulk pipeline over an injected cache and collaborators.
#[derive(Clone)]
pub struct BatchOrchestrator {
    cache: Arc<dyn CacheStore>,
    resolver: MetadataResolver,
    extractor: Arc<dyn InsightExtractor>,
    ttls: CacheTtls,
}

impl BatchOrchestrator {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        metadata: Arc<dyn MetadataSource>,
        extractor: Arc<dyn InsightExtractor>,
    ) -> Self {
        Self {
            resolver: MetadataResolver::new(cache.clone(), metadata),
            cache,
            extractor,
            ttls: CacheTtls::default(),
        }
    }

    /// Override the store TTLs applied to written entries.
    pub fn with_cache_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    /// The cache this orchestrator reads and writes.
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Run the pipeline and return the merged outcome.
    pub async fn run<S>(&self, symbols: &[S], options: &BulkOptions) -> Result<BulkOutcome>
    where
        S: AsRef<str> + Sync,
    {
        self.run_with_events(symbols, options, None).await
    }

    /// Run the pipeline, streaming a [`PipelineEvent`] per settled symbol.
    pub async fn run_with_events<S>(
        &self,
        symbols: &[S],
        options: &BulkOptions,
        events: Option<UnboundedSender<PipelineEvent>>,
    ) -> Result<BulkOutcome>
    where
        S: AsRef<str> + Sync,
    {
        options.validate()?;
        self.ttls.validate()?;

        let mut outcome = BulkOutcome {
            total_symbols: symbols.len(),
            ..Default::default()
        };
        let emit = |event: PipelineEvent| {
            if let Some(tx) = &events {
                // Receiver gone means nobody is tracking; keep going
                let _ = tx.send(event);
            }
        };

        // Normalize and de-duplicate, keeping first-seen order
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for raw in symbols {
            match Symbol::parse(raw) {
                Ok(symbol) => {
                    if seen.insert(symbol.clone()) {
                        unique.push(symbol);
                    } else {
                        outcome.duplicate_symbols += 1;
                    }
                }
                Err(error) => outcome.metadata_errors.push(MetadataFailure {
                    symbol: raw.as_ref().to_string(),
                    error,
                }),
            }
        }

        info!(
            total = outcome.total_symbols,
            unique = unique.len(),
            invalidate = options.invalidate_cache,
            "Starting bulk run"
        );

        // 1. Partition
        let (cached, to_fetch) = self.partition(unique, options).await?;
        for (symbol, results) in cached {
            emit(PipelineEvent::Cached {
                symbol: symbol.clone(),
                results: results.clone(),
            });
            outcome.results.insert(symbol, results);
            outcome.cached_count += 1;
        }

        // 2. Resolve metadata, 3. build descriptors
        let resolutions = run_bounded(to_fetch, options.metadata_concurrency, |symbol, _| async move {
            let resolved = self.resolver.resolve(&symbol).await;
            (symbol, resolved)
        })
        .await;

        let mut resolved: Vec<Resolved> = Vec::with_capacity(resolutions.len());
        for (symbol, resolution) in resolutions {
            match resolution {
                Ok(metadata) => {
                    let descriptors = requests::build(&symbol, &metadata);
                    resolved.push((symbol, descriptors));
                }
                Err(error) => {
                    warn!(symbol = %symbol, error = %error, "Skipping symbol without metadata");
                    emit(PipelineEvent::MetadataFailed {
                        symbol: symbol.clone(),
                        error: error.clone(),
                    });
                    outcome.metadata_errors.push(MetadataFailure {
                        symbol: symbol.to_string(),
                        error,
                    });
                }
            }
        }

        // 4. Chunk, 5. run chunks
        let chunks: Vec<Vec<Resolved>> = resolved
            .chunks(options.chunk_size)
            .map(<[Resolved]>::to_vec)
            .collect();
        let chunk_count = chunks.len();

        let fetched = run_bounded(chunks, options.chunk_concurrency, |chunk, index| {
            let emit = &emit;
            async move {
                let results = self.process_chunk(chunk, index, chunk_count).await;
                for (symbol, symbol_results) in &results {
                    emit(PipelineEvent::Fetched {
                        symbol: symbol.clone(),
                        results: symbol_results.clone(),
                    });
                }
                results
            }
        })
        .await;

        // 6. Merge
        for (symbol, results) in fetched.into_iter().flatten() {
            outcome.results.insert(symbol, results);
            outcome.fetched_count += 1;
        }
        outcome.processed_symbols = outcome.results.len();

        info!(
            processed = outcome.processed_symbols,
            cached = outcome.cached_count,
            fetched = outcome.fetched_count,
            metadata_errors = outcome.metadata_errors.len(),
            "Bulk run complete"
        );

        Ok(outcome)
    }

    /// Split symbols into fresh cache hits and symbols to fetch.
    async fn partition(
        &self,
        symbols: Vec<Symbol>,
        options: &BulkOptions,
    ) -> Result<(Vec<(Symbol, Vec<ExtractionResult>)>, Vec<Symbol>)> {
        if options.invalidate_cache {
            return Ok((Vec::new(), symbols));
        }

        let lookups = run_bounded(symbols, options.metadata_concurrency, |symbol, _| async move {
            let entry = self
                .cache
                .get_json::<CacheEntry>(Namespace::Results, symbol.as_str())
                .await;
            (symbol, entry)
        })
        .await;

        let now = Utc::now();
        let mut cached = Vec::new();
        let mut to_fetch = Vec::new();
        for (symbol, entry) in lookups {
            match entry {
                Ok(Some(entry)) if entry.is_fresh(options.data_ttl, now) => {
                    debug!(symbol = %symbol, "Results cache hit");
                    cached.push((symbol, entry.results));
                }
                Ok(_) => to_fetch.push(symbol),
                Err(CacheError::Serialization(e)) => {
                    warn!(symbol = %symbol, error = %e, "Unreadable cache entry, refetching");
                    to_fetch.push(symbol);
                }
                Err(e) => return Err(InsightError::Cache(e)),
            }
        }

        Ok((cached, to_fetch))
    }

    /// Fetch every descriptor of every symbol in a chunk, then persist.
    async fn process_chunk(
        &self,
        chunk: Vec<Resolved>,
        index: usize,
        chunk_count: usize,
    ) -> Vec<(Symbol, Vec<ExtractionResult>)> {
        info!(
            chunk = index + 1,
            of = chunk_count,
            symbols = chunk.len(),
            "Processing chunk"
        );

        let mut out = Vec::with_capacity(chunk.len());
        for (symbol, descriptors) in chunk {
            let symbol_ref = &symbol;
            let results = join_all(descriptors.iter().map(|descriptor| async move {
                let outcome = self.extractor.extract(descriptor).await;
                if let Err(e) = &outcome {
                    warn!(
                        symbol = %symbol_ref,
                        indicator = %descriptor.indicator_name,
                        error = %e,
                        "Extraction failed"
                    );
                }
                ExtractionResult::from_outcome(descriptor, outcome)
            }))
            .await;
            out.push((symbol, results));
        }

        let written_at = Utc::now();
        for (symbol, results) in &out {
            let mut entry = CacheEntry::new(results.clone(), written_at);
            entry.timestamp = self.next_timestamp(symbol, entry.timestamp).await;
            if let Err(e) = self
                .cache
                .set_json(Namespace::Results, symbol.as_str(), &entry, Some(self.ttls.results))
                .await
            {
                warn!(symbol = %symbol, error = %e, "Failed to cache results");
            }
        }

        out
    }

    /// Entry timestamps strictly increase per symbol, even within one millisecond.
    async fn next_timestamp(&self, symbol: &Symbol, now_ms: i64) -> i64 {
        match self
            .cache
            .get_json::<CacheEntry>(Namespace::Results, symbol.as_str())
            .await
        {
            Ok(Some(previous)) => now_ms.max(previous.timestamp + 1),
            _ => now_ms,
        }
    }
}
