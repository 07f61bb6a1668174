//! Asynchronous job tracking over orchestrator runs.
//!
//! `submit` stores a pending [`JobRecord`] and returns at once; the run
//! proceeds on its own task. Each job has exactly one writer, which folds
//! pipeline events into the record and persists it, so concurrent symbol
//! completions never lose updates.
//!
//! A terminal record is handed out once: the read that deletes it wins,
//! and later polls see `JobNotFound`.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{InsightError, Result};
use crate::orchestrator::{BatchOrchestrator, BulkOutcome, PipelineEvent};
use crate::traits::store::{CacheStore, CacheStoreExt, Namespace};
use crate::types::{
    config::{BulkOptions, TrackerConfig},
    job::JobRecord,
    symbol::Symbol,
};

/// How a job drives the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobMode {
    /// One orchestrator run with the tracker's options.
    #[default]
    Batched,

    /// Every symbol is its own chunk, run side by side.
    PerSymbol,
}

impl JobMode {
    fn options(&self, base: &BulkOptions) -> BulkOptions {
        match self {
            JobMode::Batched => base.clone(),
            JobMode::PerSymbol => base
                .clone()
                .with_chunk_size(1)
                .with_chunk_concurrency(base.metadata_concurrency),
        }
    }
}

/// Returned by [`JobTracker::submit`]; awaiting `task` waits for the job to settle.
#[derive(Debug)]
pub struct JobHandle {
    pub id: Uuid,
    pub task: JoinHandle<()>,
}

/// Submits orchestrator runs as pollable jobs.
#[derive(Clone)]
pub struct JobTracker {
    orchestrator: Arc<BatchOrchestrator>,
    config: TrackerConfig,
    options: BulkOptions,
}

impl JobTracker {
    pub fn new(orchestrator: Arc<BatchOrchestrator>, config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            orchestrator,
            config,
            options: BulkOptions::default(),
        })
    }

    /// Orchestrator options used by submitted jobs.
    pub fn with_options(mut self, options: BulkOptions) -> Result<Self> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    fn cache(&self) -> &Arc<dyn CacheStore> {
        self.orchestrator.cache()
    }

    /// Validate input, store a pending record and start the job.
    pub async fn submit<S: AsRef<str>>(&self, symbols: &[S], mode: JobMode) -> Result<JobHandle> {
        let symbols = self.validate(symbols)?;
        let id = Uuid::new_v4();

        let record = JobRecord::pending(id, symbols.len());
        self.cache()
            .set_json(Namespace::Jobs, &id.to_string(), &record, Some(self.config.job_ttl))
            .await?;

        info!(job_id = %id, stocks = symbols.len(), mode = ?mode, "Job submitted");

        let tracker = self.clone();
        let options = mode.options(&self.options);
        let task = tokio::spawn(async move { tracker.drive(record, symbols, options).await });

        Ok(JobHandle { id, task })
    }

    /// Current record of a job.
    ///
    /// A terminal record is deleted as it is returned; only the caller whose
    /// delete removed it gets the record.
    pub async fn status(&self, id: Uuid) -> Result<JobRecord> {
        let key = id.to_string();
        let record: JobRecord = self
            .cache()
            .get_json(Namespace::Jobs, &key)
            .await?
            .ok_or(InsightError::JobNotFound(id))?;

        if !record.status.is_terminal() {
            return Ok(record);
        }

        if self.cache().delete(Namespace::Jobs, &key).await? {
            info!(job_id = %id, status = ?record.status, "Terminal job record consumed");
            Ok(record)
        } else {
            Err(InsightError::JobNotFound(id))
        }
    }

    fn validate<S: AsRef<str>>(&self, symbols: &[S]) -> Result<Vec<Symbol>> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for raw in symbols {
            let symbol = Symbol::parse(raw).map_err(|_| InsightError::InvalidInput {
                reason: "symbols must be non-empty".to_string(),
            })?;
            if seen.insert(symbol.clone()) {
                unique.push(symbol);
            }
        }

        if unique.is_empty() {
            return Err(InsightError::InvalidInput {
                reason: "at least one symbol is required".to_string(),
            });
        }
        if unique.len() > self.config.max_stocks_per_job {
            return Err(InsightError::InvalidInput {
                reason: format!(
                    "at most {} symbols per job, got {}",
                    self.config.max_stocks_per_job,
                    unique.len()
                ),
            });
        }
        Ok(unique)
    }

    /// Run the orchestrator and the record writer side by side.
    async fn drive(self, record: JobRecord, symbols: Vec<Symbol>, options: BulkOptions) {
        let id = record.id;
        let (tx, rx) = mpsc::unbounded_channel();

        let orchestrator = self.orchestrator.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .run_with_events(&symbols, &options, Some(tx))
                .await
        });

        let (run_result, mut record) = tokio::join!(run, self.write_events(record, rx));

        let before = record.clone();
        match run_result {
            Ok(Ok(outcome)) => reconcile(&mut record, outcome),
            Ok(Err(e)) => {
                warn!(job_id = %id, error = %e, "Job orchestration failed");
                record.fail(e.to_string());
            }
            Err(join_error) => {
                let message = panic_message(join_error);
                warn!(job_id = %id, error = %message, "Job orchestration aborted");
                record.fail(message);
            }
        }

        // A terminal record may already have been consumed; only write real changes
        if record != before {
            self.persist(&record).await;
        }

        info!(
            job_id = %id,
            status = ?record.status,
            completed = record.completed_stocks,
            total = record.total_stocks,
            "Job finished"
        );
    }

    /// Single writer: apply each event and persist the updated record.
    async fn write_events(
        &self,
        mut record: JobRecord,
        mut rx: UnboundedReceiver<PipelineEvent>,
    ) -> JobRecord {
        while let Some(event) = rx.recv().await {
            let counted = match event {
                PipelineEvent::Cached { symbol, results } | PipelineEvent::Fetched { symbol, results } => {
                    record.complete_with_results(symbol, results)
                }
                PipelineEvent::MetadataFailed { symbol, error } => {
                    record.complete_with_error(symbol, error.to_string())
                }
            };
            if counted {
                self.persist(&record).await;
            }
        }
        record
    }

    async fn persist(&self, record: &JobRecord) {
        if let Err(e) = self
            .cache()
            .set_json(
                Namespace::Jobs,
                &record.id.to_string(),
                record,
                Some(self.config.job_ttl),
            )
            .await
        {
            warn!(job_id = %record.id, error = %e, "Failed to persist job record");
        }
    }
}

/// Count any symbol the event stream did not report.
fn reconcile(record: &mut JobRecord, outcome: BulkOutcome) {
    for (symbol, results) in outcome.results {
        record.complete_with_results(symbol, results);
    }
    for failure in outcome.metadata_errors {
        if let Ok(symbol) = Symbol::parse(&failure.symbol) {
            record.complete_with_error(symbol, failure.error.to_string());
        }
    }
    if !record.status.is_terminal() {
        record.fail(format!(
            "run finished with {} of {} symbols settled",
            record.completed_stocks, record.total_stocks
        ));
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return format!("orchestration task cancelled: {error}");
    }
    let payload = error.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("orchestration panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::{FailingStore, MockExtractor, MockMetadataSource};
    use crate::types::job::JobStatus;

    fn tracker_with(cache: Arc<dyn CacheStore>, extractor: MockExtractor) -> JobTracker {
        let metadata = MockMetadataSource::new()
            .with_metadata("TCS", "1372", "tcs")
            .with_metadata("INFY", "1373", "infy")
            .with_metadata("WIPRO", "1374", "wipro");
        let orchestrator = BatchOrchestrator::new(cache, Arc::new(metadata), Arc::new(extractor));
        JobTracker::new(Arc::new(orchestrator), TrackerConfig::default()).unwrap()
    }

    fn tracker() -> JobTracker {
        tracker_with(Arc::new(MemoryStore::new()), MockExtractor::new())
    }

    #[tokio::test]
    async fn test_submit_returns_pending() {
        let tracker = tracker();
        let handle = tracker.submit(&["TCS", "INFY"], JobMode::Batched).await.unwrap();

        let record = tracker.status(handle.id).await.unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.total_stocks, 2);

        handle.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_resolves_then_consumed() {
        let tracker = tracker();
        let handle = tracker
            .submit(&["TCS", "INFY", "NOPE"], JobMode::PerSymbol)
            .await
            .unwrap();
        let id = handle.id;
        handle.task.await.unwrap();

        let record = tracker.status(id).await.unwrap();
        assert_eq!(record.status, JobStatus::Resolved);
        assert_eq!(record.completed_stocks, 3);
        assert_eq!(record.results.len(), 2);
        assert_eq!(record.errors.len(), 1);

        assert!(matches!(
            tracker.status(id).await,
            Err(InsightError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_racing_terminal_reads() {
        let tracker = tracker();
        let handle = tracker.submit(&["TCS"], JobMode::Batched).await.unwrap();
        let id = handle.id;
        handle.task.await.unwrap();

        let (a, b) = tokio::join!(tracker.status(id), tracker.status(id));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let err = tracker().status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, InsightError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let tracker = tracker();
        let empty: [&str; 0] = [];
        assert!(matches!(
            tracker.submit(&empty, JobMode::Batched).await,
            Err(InsightError::InvalidInput { .. })
        ));
        assert!(matches!(
            tracker.submit(&["TCS", " "], JobMode::Batched).await,
            Err(InsightError::InvalidInput { .. })
        ));

        let many: Vec<String> = (0..21).map(|i| format!("S{i}")).collect();
        assert!(matches!(
            tracker.submit(&many, JobMode::Batched).await,
            Err(InsightError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicates_counted_once() {
        let tracker = tracker();
        let handle = tracker
            .submit(&["TCS", "tcs", "INFY"], JobMode::Batched)
            .await
            .unwrap();
        let id = handle.id;
        handle.task.await.unwrap();

        let record = tracker.status(id).await.unwrap();
        assert_eq!(record.total_stocks, 2);
        assert_eq!(record.completed_stocks, 2);
    }

    #[tokio::test]
    async fn test_panic_fails_job_keeping_partial_results() {
        let tracker = tracker_with(
            Arc::new(MemoryStore::new()),
            MockExtractor::new().with_panic_on("/INFY/"),
        )
        .with_options(BulkOptions::new().with_chunk_size(1))
        .unwrap();

        let handle = tracker.submit(&["TCS", "INFY"], JobMode::Batched).await.unwrap();
        let id = handle.id;
        handle.task.await.unwrap();

        let record = tracker.status(id).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("panicked"));
        assert_eq!(record.completed_stocks, 1);
        assert!(record.results.contains_key(&Symbol::parse("TCS").unwrap()));
    }

    #[tokio::test]
    async fn test_store_outage_rejects_submit() {
        let tracker = tracker_with(Arc::new(FailingStore::new()), MockExtractor::new());
        let err = tracker.submit(&["TCS"], JobMode::Batched).await.unwrap_err();
        assert!(matches!(err, InsightError::Cache(_)));
    }

    #[test]
    fn test_per_symbol_mode_options() {
        let base = BulkOptions::new().with_metadata_concurrency(4).with_chunk_size(10);
        let options = JobMode::PerSymbol.options(&base);
        assert_eq!(options.chunk_size, 1);
        assert_eq!(options.chunk_concurrency, 4);
        assert_eq!(JobMode::Batched.options(&base), base);
    }
}
