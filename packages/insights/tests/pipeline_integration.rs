//! Integration tests for the bulk pipeline.
//!
//! These tests drive the public API end to end through the mock
//! collaborators:
//! 1. Orchestrator runs over a shared cache
//! 2. Jobs submitted, polled and consumed
//! 3. Resumable ticks across an index
//! 4. Index rebuild

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use insights::{
    maintenance,
    testing::{MockExtractor, MockIndexSource, MockMetadataSource},
    BatchOrchestrator, BulkOptions, CacheEntry, CacheStore, CacheStoreExt, FetchError,
    InsightError, JobMode, JobStatus, JobTracker, MemoryStore, Namespace, ResumableConfig,
    ResumableRunner, Symbol, TickOutcome, TrackerConfig,
};

const UNIVERSE: [&str; 6] = ["TCS", "INFY", "WIPRO", "HCLTECH", "TECHM", "LTIM"];

/// Helper to build metadata for every symbol in the test universe.
fn metadata_source() -> MockMetadataSource {
    UNIVERSE
        .iter()
        .enumerate()
        .fold(MockMetadataSource::new(), |source, (i, symbol)| {
            source.with_metadata(symbol, (1000 + i).to_string(), symbol.to_lowercase())
        })
}

/// Helper to wire an orchestrator over a shared cache.
fn setup(cache: Arc<MemoryStore>, extractor: Arc<MockExtractor>) -> Arc<BatchOrchestrator> {
    Arc::new(BatchOrchestrator::new(
        cache,
        Arc::new(metadata_source()),
        extractor,
    ))
}

fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

#[tokio::test]
async fn test_end_to_end_two_symbols() {
    let cache = Arc::new(MemoryStore::new());
    let extractor = Arc::new(MockExtractor::new());
    let orchestrator = setup(cache.clone(), extractor.clone());

    let options = BulkOptions::new().with_chunk_size(1).with_chunk_concurrency(1);
    let outcome = orchestrator.run(&["TCS", "INFY"], &options).await.unwrap();

    assert_eq!(outcome.fetched_count, 2);
    assert_eq!(outcome.cached_count, 0);
    assert_eq!(outcome.results.len(), 2);

    // Sequential chunks: every TCS request precedes every INFY request
    let calls = extractor.calls();
    let last_tcs = calls.iter().rposition(|u| u.contains("/TCS/")).unwrap();
    let first_infy = calls.iter().position(|u| u.contains("/INFY/")).unwrap();
    assert!(last_tcs < first_infy);

    assert_eq!(cache.size(Namespace::Results).await.unwrap(), 2);
    assert_eq!(cache.size(Namespace::Metadata).await.unwrap(), 2);
}

#[tokio::test]
async fn test_results_keep_template_order() {
    let orchestrator = setup(Arc::new(MemoryStore::new()), Arc::new(MockExtractor::new()));

    let outcome = orchestrator
        .run(&["WIPRO"], &BulkOptions::default())
        .await
        .unwrap();
    let names: Vec<_> = outcome.results[&sym("WIPRO")]
        .iter()
        .map(|r| r.indicator_name.as_str())
        .collect();

    assert_eq!(names.first(), Some(&"PE"));
    assert_eq!(names.last(), Some(&"FinancialInsights"));
    assert_eq!(names.len(), 8);
}

#[tokio::test]
async fn test_cached_results_returned_unchanged() {
    let cache = Arc::new(MemoryStore::new());
    let extractor = Arc::new(MockExtractor::new());
    let orchestrator = setup(cache.clone(), extractor.clone());

    orchestrator
        .run(&["TCS", "INFY"], &BulkOptions::default())
        .await
        .unwrap();
    let stored: CacheEntry = cache
        .get_json(Namespace::Results, "TCS")
        .await
        .unwrap()
        .unwrap();

    let again = orchestrator
        .run(&["tcs", "WIPRO"], &BulkOptions::default())
        .await
        .unwrap();

    assert_eq!(again.cached_count, 1);
    assert_eq!(again.fetched_count, 1);
    assert_eq!(again.results[&sym("TCS")], stored.results);
    assert_eq!(extractor.call_count(), 24);
}

#[tokio::test]
async fn test_metadata_is_not_refetched() {
    let cache = Arc::new(MemoryStore::new());
    let metadata = Arc::new(metadata_source());
    let orchestrator = BatchOrchestrator::new(cache, metadata.clone(), Arc::new(MockExtractor::new()));

    let options = BulkOptions::new().with_invalidate_cache(true);
    orchestrator.run(&["TCS"], &options).await.unwrap();
    orchestrator.run(&["TCS"], &options).await.unwrap();

    assert_eq!(metadata.lookups_for("TCS"), 1);
}

#[tokio::test]
async fn test_fetch_failure_source_reported() {
    let cache = Arc::new(MemoryStore::new());
    let metadata = Arc::new(metadata_source().with_failure(
        "TECHM",
        FetchError::Status {
            url: "https://trendlyne.com/equity/TECHM/stock-page/".to_string(),
            status: 503,
        },
    ));
    let orchestrator = BatchOrchestrator::new(cache, metadata, Arc::new(MockExtractor::new()));

    let outcome = orchestrator
        .run(&["TCS", "TECHM", "UNKNOWN"], &BulkOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.metadata_errors.len(), 2);
    assert_eq!(outcome.processed_symbols, 1);
    assert!(outcome
        .metadata_errors
        .iter()
        .any(|f| f.symbol == "TECHM" && f.error.to_string().contains("503")));
}

#[tokio::test]
async fn test_chunk_concurrency_overlaps_chunks() {
    let extractor = Arc::new(MockExtractor::new().with_delay(Duration::from_millis(20)));
    let orchestrator = setup(Arc::new(MemoryStore::new()), extractor.clone());

    let options = BulkOptions::new().with_chunk_size(1).with_chunk_concurrency(3);
    let outcome = orchestrator.run(&UNIVERSE, &options).await.unwrap();

    assert_eq!(outcome.fetched_count, 6);
    // Three chunks in flight, each fetching eight descriptors at once
    assert_eq!(extractor.peak_in_flight(), 24);
}

#[tokio::test]
async fn test_job_lifecycle() {
    let cache = Arc::new(MemoryStore::new());
    let orchestrator = setup(cache.clone(), Arc::new(MockExtractor::new()));
    let tracker = JobTracker::new(orchestrator, TrackerConfig::default()).unwrap();

    let handle = tracker
        .submit(&["TCS", "INFY", "MISSING"], JobMode::Batched)
        .await
        .unwrap();
    let id = handle.id;

    let pending = tracker.status(id).await.unwrap();
    assert_eq!(pending.status, JobStatus::Pending);
    assert_eq!(pending.completed_stocks, 0);

    handle.task.await.unwrap();

    let done = tracker.status(id).await.unwrap();
    assert_eq!(done.status, JobStatus::Resolved);
    assert_eq!(done.completed_stocks, done.total_stocks);
    assert_eq!(done.results.len(), 2);
    assert!(done.errors.contains_key(&sym("MISSING")));

    assert!(matches!(
        tracker.status(id).await,
        Err(InsightError::JobNotFound(_))
    ));
    assert_eq!(cache.size(Namespace::Jobs).await.unwrap(), 0);
}

#[tokio::test]
async fn test_job_limit_is_configurable() {
    let orchestrator = setup(Arc::new(MemoryStore::new()), Arc::new(MockExtractor::new()));
    let tracker = JobTracker::new(
        orchestrator,
        TrackerConfig::new().with_max_stocks_per_job(2),
    )
    .unwrap();

    let err = tracker
        .submit(&["TCS", "INFY", "WIPRO"], JobMode::PerSymbol)
        .await
        .unwrap_err();
    assert!(matches!(err, InsightError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_resumable_index_over_ticks() {
    let cache = Arc::new(MemoryStore::new());
    let orchestrator = setup(cache.clone(), Arc::new(MockExtractor::new()));
    let source = Arc::new(MockIndexSource::new().with_members(
        "NIFTY IT",
        &["TCS", "INFY", "WIPRO", "HCLTECH", "TECHM"],
    ));
    let runner = ResumableRunner::new(orchestrator, ResumableConfig::new().with_chunk_size(2))
        .unwrap()
        .with_index_source(source.clone());

    let mut ticks = 0;
    loop {
        ticks += 1;
        let outcome = runner.tick_index("NIFTY IT").await.unwrap();
        if outcome.state().completed {
            break;
        }
        assert!(ticks < 10, "runner never completed");
    }
    assert_eq!(ticks, 3);
    assert_eq!(cache.size(Namespace::Results).await.unwrap(), 5);

    let skipped = runner.tick_index("NIFTY IT").await.unwrap();
    assert!(matches!(skipped, TickOutcome::Skipped { .. }));

    // Membership change invalidates the completed cycle
    source.set_members("NIFTY IT", &["TCS", "INFY", "WIPRO", "HCLTECH", "LTIM"]);
    let restarted = runner.tick_index("NIFTY IT").await.unwrap();
    assert_eq!(restarted.state().cursor, 2);
    assert!(!restarted.state().completed);
}

#[tokio::test]
async fn test_rebuild_keeps_metadata() {
    let cache = Arc::new(MemoryStore::new());
    let metadata = Arc::new(metadata_source());
    let orchestrator = BatchOrchestrator::new(cache.clone(), metadata.clone(), Arc::new(MockExtractor::new()));
    let source = MockIndexSource::new().with_members("NIFTY IT", &["TCS", "INFY"]);

    orchestrator
        .run(&["TCS", "INFY"], &BulkOptions::default())
        .await
        .unwrap();

    let report = maintenance::rebuild_index(&orchestrator, &source, "NIFTY IT", true, &BulkOptions::default())
        .await
        .unwrap();

    assert_eq!(report.cleared, 2);
    assert_eq!(report.outcome.fetched_count, 2);
    assert_eq!(metadata.lookup_count(), 2);

    let sizes = maintenance::cache_sizes(cache.as_ref()).await.unwrap();
    assert_eq!(sizes["results"], 2);
    assert_eq!(sizes["metadata"], 2);
}

#[tokio::test]
async fn test_entry_written_at_run_time() {
    let cache = Arc::new(MemoryStore::new());
    let orchestrator = setup(cache.clone(), Arc::new(MockExtractor::new()));

    let before = Utc::now().timestamp_millis();
    orchestrator
        .run(&["LTIM"], &BulkOptions::default())
        .await
        .unwrap();
    let after = Utc::now().timestamp_millis();

    let entry: CacheEntry = cache
        .get_json(Namespace::Results, "LTIM")
        .await
        .unwrap()
        .unwrap();
    assert!(entry.timestamp >= before && entry.timestamp <= after);
}
