//! Extraction results and the cache entries that hold them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::FetchError;
use crate::types::request::{Category, RequestDescriptor};

/// Shape of a successfully extracted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Json,
    Html,
}

/// What an extractor returns for one descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPayload {
    pub kind: PayloadKind,
    pub data: serde_json::Value,
}

impl ExtractedPayload {
    pub fn json(data: serde_json::Value) -> Self {
        Self {
            kind: PayloadKind::Json,
            data,
        }
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Html,
            data: serde_json::Value::String(html.into()),
        }
    }
}

/// Outcome of one descriptor: the descriptor's identity plus data or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub category: Category,
    pub indicator_name: String,
    pub url: String,
    pub requires_secondary_parse: bool,
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PayloadKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Unparsed value kept on parse failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    /// Successful result for a descriptor.
    pub fn success(descriptor: &RequestDescriptor, payload: ExtractedPayload) -> Self {
        Self {
            success: true,
            kind: Some(payload.kind),
            data: Some(payload.data),
            ..Self::base(descriptor)
        }
    }

    /// Failed result for a descriptor; parse failures keep their raw value.
    pub fn failure(descriptor: &RequestDescriptor, error: &FetchError) -> Self {
        Self {
            success: false,
            raw_value: error.raw().map(str::to_string),
            error: Some(error.to_string()),
            ..Self::base(descriptor)
        }
    }

    /// Convert an extractor outcome into a result.
    pub fn from_outcome(
        descriptor: &RequestDescriptor,
        outcome: Result<ExtractedPayload, FetchError>,
    ) -> Self {
        match outcome {
            Ok(payload) => Self::success(descriptor, payload),
            Err(e) => Self::failure(descriptor, &e),
        }
    }

    fn base(descriptor: &RequestDescriptor) -> Self {
        Self {
            category: descriptor.category,
            indicator_name: descriptor.indicator_name.clone(),
            url: descriptor.url.clone(),
            requires_secondary_parse: descriptor.requires_secondary_parse,
            success: false,
            kind: None,
            data: None,
            raw_value: None,
            error: None,
        }
    }
}

/// Cached results for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub results: Vec<ExtractionResult>,

    /// When the results were written (epoch milliseconds)
    pub timestamp: i64,
}

impl CacheEntry {
    pub fn new(results: Vec<ExtractionResult>, at: DateTime<Utc>) -> Self {
        Self {
            results,
            timestamp: at.timestamp_millis(),
        }
    }

    /// Fresh iff `now - timestamp < ttl`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age_ms = now.timestamp_millis() - self.timestamp;
        i128::from(age_ms) < ttl.as_millis() as i128
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::request::TargetSelector;

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor {
            category: Category::Financials,
            indicator_name: "FinancialInsights".to_string(),
            url: "https://example.com/f".to_string(),
            target: TargetSelector::attribute("data-stock-insight"),
            requires_secondary_parse: false,
        }
    }

    #[test]
    fn test_parse_failure_keeps_raw() {
        let err = FetchError::Parse {
            message: "Could not parse as JSON".to_string(),
            raw: "{oops".to_string(),
        };
        let result = ExtractionResult::failure(&descriptor(), &err);

        assert!(!result.success);
        assert_eq!(result.raw_value.as_deref(), Some("{oops"));
        assert_eq!(result.indicator_name, "FinancialInsights");
    }

    #[test]
    fn test_success_serializes_camel_case() {
        let result = ExtractionResult::success(
            &descriptor(),
            ExtractedPayload::json(serde_json::json!({"a": 1})),
        );
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["indicatorName"], "FinancialInsights");
        assert_eq!(value["kind"], "json");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_cache_entry_freshness() {
        let written = Utc::now();
        let entry = CacheEntry::new(vec![], written);
        let ttl = Duration::from_secs(60);

        assert!(entry.is_fresh(ttl, written + chrono::Duration::seconds(59)));
        assert!(!entry.is_fresh(ttl, written + chrono::Duration::seconds(60)));
    }
}
