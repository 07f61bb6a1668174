//! Cache administration and the index rebuild entry point.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::{InsightError, Result};
use crate::orchestrator::{BatchOrchestrator, BulkOutcome};
use crate::traits::{
    source::IndexSource,
    store::{CacheStore, Namespace},
};
use crate::types::{config::BulkOptions, symbol::Symbol};

/// Live entry count of every namespace.
pub async fn cache_sizes(store: &dyn CacheStore) -> Result<BTreeMap<&'static str, usize>> {
    let mut sizes = BTreeMap::new();
    for ns in Namespace::ALL {
        sizes.insert(ns.as_str(), store.size(ns).await?);
    }
    Ok(sizes)
}

/// Drop cached results and job records ahead of a rebuild. Metadata is kept.
pub async fn clear_for_rebuild(store: &dyn CacheStore) -> Result<usize> {
    let results = store.clear(Namespace::Results).await?;
    let jobs = store.clear(Namespace::Jobs).await?;
    info!(results, jobs, "Cleared caches for rebuild");
    Ok(results + jobs)
}

/// Outcome of a full index rebuild.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub index_name: String,
    pub symbols: Vec<Symbol>,
    pub cleared: usize,
    pub outcome: BulkOutcome,
}

/// Refetch every member of an index in one orchestrator run.
///
/// `clear_first` empties `results` and `jobs` before fetching; `options`
/// decides whether remaining fresh entries are reused.
pub async fn rebuild_index(
    orchestrator: &BatchOrchestrator,
    source: &dyn IndexSource,
    index_name: &str,
    clear_first: bool,
    options: &BulkOptions,
) -> Result<RebuildReport> {
    let cleared = if clear_first {
        clear_for_rebuild(orchestrator.cache().as_ref()).await?
    } else {
        0
    };

    let symbols = source
        .members(index_name)
        .await
        .map_err(InsightError::IndexSource)?;
    info!(index = index_name, members = symbols.len(), "Rebuilding index");

    let outcome = orchestrator.run(&symbols, options).await?;

    Ok(RebuildReport {
        index_name: index_name.to_string(),
        symbols,
        cleared,
        outcome,
    })
}
