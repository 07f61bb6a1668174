//! Resumable, chunked processing of index lists across scheduled ticks.
//!
//! Each tick processes at most one chunk and persists a [`BatchState`]
//! per index name:
//!
//! ```text
//! fresh ──► in-progress ──► completed ──(cool-down elapsed)──► fresh
//!   ▲                                                          │
//!   └──────────── membership fingerprint changed ◄─────────────┘
//! ```
//!
//! A failed chunk leaves the cursor where it was, so the next tick retries it.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{CacheError, InsightError, Result};
use crate::orchestrator::{BatchOrchestrator, BulkOutcome};
use crate::traits::{
    source::IndexSource,
    store::{CacheStore, CacheStoreExt, Namespace},
};
use crate::types::{
    batch::{fingerprint, BatchState},
    config::ResumableConfig,
    symbol::Symbol,
};

/// What a tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Completed within the cool-down window; nothing ran
    Skipped { state: BatchState },

    /// A chunk ran and the cursor advanced
    Processed {
        state: BatchState,
        chunk: Vec<Symbol>,
        outcome: BulkOutcome,
    },

    /// The chunk failed; the cursor was kept
    Failed { state: BatchState, error: String },
}

impl TickOutcome {
    pub fn state(&self) -> &BatchState {
        match self {
            TickOutcome::Skipped { state }
            | TickOutcome::Processed { state, .. }
            | TickOutcome::Failed { state, .. } => state,
        }
    }
}

/// Drives one chunk per tick through the orchestrator.
pub struct ResumableRunner {
    orchestrator: Arc<BatchOrchestrator>,
    index_source: Option<Arc<dyn IndexSource>>,
    config: ResumableConfig,
}

impl ResumableRunner {
    pub fn new(orchestrator: Arc<BatchOrchestrator>, config: ResumableConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            orchestrator,
            index_source: None,
            config,
        })
    }

    /// Source used by [`ResumableRunner::tick_index`].
    pub fn with_index_source(mut self, source: Arc<dyn IndexSource>) -> Self {
        self.index_source = Some(source);
        self
    }

    fn cache(&self) -> &Arc<dyn CacheStore> {
        self.orchestrator.cache()
    }

    /// Resolve the index's membership, then tick.
    pub async fn tick_index(&self, index_name: &str) -> Result<TickOutcome> {
        let source = self.index_source.as_ref().ok_or_else(|| InsightError::InvalidInput {
            reason: "no index source configured".to_string(),
        })?;
        let members = source
            .members(index_name)
            .await
            .map_err(InsightError::IndexSource)?;
        self.tick(index_name, &members).await
    }

    pub async fn tick<S: AsRef<str> + Sync>(&self, index_name: &str, symbols: &[S]) -> Result<TickOutcome> {
        self.tick_at(index_name, symbols, Utc::now()).await
    }

    /// Tick with an explicit clock.
    pub async fn tick_at<S: AsRef<str> + Sync>(
        &self,
        index_name: &str,
        symbols: &[S],
        now: DateTime<Utc>,
    ) -> Result<TickOutcome> {
        let symbols: Vec<Symbol> = symbols
            .iter()
            .filter_map(|raw| Symbol::parse(raw).ok())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let fp = fingerprint(&symbols);

        let mut state = match self.load(index_name).await? {
            Some(state) if state.fingerprint != fp => {
                info!(index = index_name, "Index membership changed, restarting");
                self.fresh(index_name, symbols.len(), fp)
            }
            Some(state) if state.completed => {
                let since = now.timestamp_millis() - state.last_run;
                if i128::from(since) < self.config.cooldown.as_millis() as i128 {
                    info!(index = index_name, "Index completed recently, skipping");
                    return Ok(TickOutcome::Skipped { state });
                }
                info!(index = index_name, "Cool-down elapsed, starting new cycle");
                self.fresh(index_name, symbols.len(), fp)
            }
            Some(mut state) => {
                state.chunk_size = self.config.chunk_size;
                state
            }
            None => self.fresh(index_name, symbols.len(), fp),
        };

        let start = state.cursor.min(symbols.len());
        let end = (start + state.chunk_size).min(symbols.len());
        let chunk = symbols[start..end].to_vec();

        info!(
            index = index_name,
            cursor = start,
            chunk = chunk.len(),
            total = state.total_symbols,
            "Processing index chunk"
        );

        let result = if chunk.is_empty() {
            Ok(BulkOutcome::default())
        } else {
            self.orchestrator.run(&chunk, &self.config.bulk).await
        };

        state.last_run = now.timestamp_millis();
        let outcome = match result {
            Ok(outcome) => {
                state.cursor = end;
                state.last_error = None;
                if state.cursor >= state.total_symbols {
                    state.completed = true;
                    state.cursor = 0;
                    info!(index = index_name, "Index cycle completed");
                }
                self.save(&state).await?;
                TickOutcome::Processed {
                    state,
                    chunk,
                    outcome,
                }
            }
            Err(e) => {
                warn!(index = index_name, cursor = start, error = %e, "Index chunk failed");
                state.last_error = Some(e.to_string());
                self.save(&state).await?;
                TickOutcome::Failed {
                    error: e.to_string(),
                    state,
                }
            }
        };

        Ok(outcome)
    }

    /// Persisted state for an index, if any.
    pub async fn state(&self, index_name: &str) -> Result<Option<BatchState>> {
        self.load(index_name).await
    }

    /// Forget an index's progress.
    pub async fn reset(&self, index_name: &str) -> Result<bool> {
        Ok(self.cache().delete(Namespace::BatchState, index_name).await?)
    }

    fn fresh(&self, index_name: &str, total: usize, fp: String) -> BatchState {
        BatchState::fresh(index_name, self.config.chunk_size, total, fp)
    }

    async fn load(&self, index_name: &str) -> Result<Option<BatchState>> {
        match self
            .cache()
            .get_json::<BatchState>(Namespace::BatchState, index_name)
            .await
        {
            Ok(state) => Ok(state),
            Err(CacheError::Serialization(e)) => {
                warn!(index = index_name, error = %e, "Unreadable batch state, starting fresh");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &BatchState) -> Result<()> {
        self.cache()
            .set_json(Namespace::BatchState, &state.index_name, state, None)
            .await?;
        Ok(())
    }
}
