//! External collaborators: metadata lookup, insight extraction, index membership.
//!
//! Implementations do the network and parsing work; the pipeline only
//! sees the typed outcome.

use async_trait::async_trait;

use crate::error::FetchResult;
use crate::types::{
    request::RequestDescriptor,
    result::ExtractedPayload,
    symbol::{Metadata, Symbol},
};

/// Looks up the identifiers needed to build a symbol's request URLs.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Returns `Ok(None)` when the source has no identifiers for the symbol.
    async fn lookup(&self, symbol: &Symbol) -> FetchResult<Option<Metadata>>;
}

/// Fetches one descriptor's page and extracts its target.
#[async_trait]
pub trait InsightExtractor: Send + Sync {
    async fn extract(&self, descriptor: &RequestDescriptor) -> FetchResult<ExtractedPayload>;
}

/// Lists the constituent symbols of a named index.
#[async_trait]
pub trait IndexSource: Send + Sync {
    async fn members(&self, index_name: &str) -> FetchResult<Vec<Symbol>>;
}
