//! Job records for asynchronous bulk runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::result::ExtractionResult;
use crate::types::symbol::Symbol;

/// Lifecycle of a job. `Resolved` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Resolved,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Pollable state of one submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,

    /// Per-symbol results, filled as symbols complete
    pub results: BTreeMap<Symbol, Vec<ExtractionResult>>,

    /// Symbol-level failures (e.g. missing metadata)
    pub errors: BTreeMap<Symbol, String>,

    pub completed_stocks: usize,
    pub total_stocks: usize,

    /// Orchestration failure message for `Failed` jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A fresh pending record.
    pub fn pending(id: Uuid, total_stocks: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
            completed_stocks: 0,
            total_stocks,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a symbol's results. Returns false if the symbol was already counted.
    pub fn complete_with_results(&mut self, symbol: Symbol, results: Vec<ExtractionResult>) -> bool {
        if self.is_counted(&symbol) {
            return false;
        }
        self.results.insert(symbol, results);
        self.bump();
        true
    }

    /// Record a symbol-level failure. Returns false if the symbol was already counted.
    pub fn complete_with_error(&mut self, symbol: Symbol, message: impl Into<String>) -> bool {
        if self.is_counted(&symbol) {
            return false;
        }
        self.errors.insert(symbol, message.into());
        self.bump();
        true
    }

    /// Mark the job failed, keeping whatever partial results exist.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error = Some(message.into());
        self.updated_at = Utc::now();
    }

    fn is_counted(&self, symbol: &Symbol) -> bool {
        self.results.contains_key(symbol) || self.errors.contains_key(symbol)
    }

    fn bump(&mut self) {
        self.completed_stocks = (self.completed_stocks + 1).min(self.total_stocks);
        if self.completed_stocks == self.total_stocks && self.status == JobStatus::Pending {
            self.status = JobStatus::Resolved;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    #[test]
    fn test_resolves_once_all_counted() {
        let mut record = JobRecord::pending(Uuid::new_v4(), 2);

        assert!(record.complete_with_results(sym("TCS"), vec![]));
        assert_eq!(record.status, JobStatus::Pending);

        assert!(record.complete_with_error(sym("NOPE"), "missing"));
        assert_eq!(record.status, JobStatus::Resolved);
        assert_eq!(record.completed_stocks, 2);
    }

    #[test]
    fn test_duplicate_completion_ignored() {
        let mut record = JobRecord::pending(Uuid::new_v4(), 2);

        assert!(record.complete_with_results(sym("TCS"), vec![]));
        assert!(!record.complete_with_results(sym("TCS"), vec![]));
        assert!(!record.complete_with_error(sym("TCS"), "late"));
        assert_eq!(record.completed_stocks, 1);
    }

    #[test]
    fn test_resolved_never_regresses() {
        let mut record = JobRecord::pending(Uuid::new_v4(), 1);
        record.complete_with_results(sym("TCS"), vec![]);
        record.fail("boom");

        assert_eq!(record.status, JobStatus::Resolved);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let record = JobRecord::pending(Uuid::new_v4(), 3);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["status"], "pending");
        assert_eq!(value["totalStocks"], 3);
    }
}
