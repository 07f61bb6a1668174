//! Testing utilities including mock implementations.
//!
//! These are useful for driving the pipeline end to end without making
//! real network calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{CacheError, CacheResult, FetchError, FetchResult};
use crate::traits::{
    source::{IndexSource, InsightExtractor, MetadataSource},
    store::{CacheStore, Namespace},
};
use crate::types::{
    request::RequestDescriptor,
    result::ExtractedPayload,
    symbol::{Metadata, Symbol},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock metadata source with predefined identifiers per symbol.
///
/// Symbols with neither metadata nor a failure resolve to `None`.
#[derive(Default)]
pub struct MockMetadataSource {
    metadata: HashMap<String, Metadata>,
    failures: HashMap<String, FetchError>,
    delay: Option<Duration>,

    /// Call tracking for assertions
    lookups: Mutex<Vec<Symbol>>,
}

impl MockMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add identifiers for a symbol.
    pub fn with_metadata(
        mut self,
        symbol: impl AsRef<str>,
        pk: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        self.metadata
            .insert(symbol.as_ref().to_uppercase(), Metadata::new(pk, slug));
        self
    }

    /// Make lookups for a symbol fail.
    pub fn with_failure(mut self, symbol: impl AsRef<str>, error: FetchError) -> Self {
        self.failures.insert(symbol.as_ref().to_uppercase(), error);
        self
    }

    /// Sleep before answering each lookup.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn lookup_count(&self) -> usize {
        lock(&self.lookups).len()
    }

    /// Number of lookups made for one symbol.
    pub fn lookups_for(&self, symbol: &str) -> usize {
        lock(&self.lookups)
            .iter()
            .filter(|s| s.as_str() == symbol)
            .count()
    }
}

#[async_trait]
impl MetadataSource for MockMetadataSource {
    async fn lookup(&self, symbol: &Symbol) -> FetchResult<Option<Metadata>> {
        lock(&self.lookups).push(symbol.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.get(symbol.as_str()) {
            return Err(error.clone());
        }
        Ok(self.metadata.get(symbol.as_str()).cloned())
    }
}

/// A mock extractor that answers every descriptor with a small JSON payload.
///
/// Failures are configured per indicator name; a panic can be injected to
/// exercise job-level failure handling.
#[derive(Default)]
pub struct MockExtractor {
    failures: HashMap<String, FetchError>,
    url_failures: HashMap<String, FetchError>,
    panic_on: Option<String>,
    delay: Option<Duration>,

    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every descriptor with this indicator name.
    pub fn with_failure(mut self, indicator: impl Into<String>, error: FetchError) -> Self {
        self.failures.insert(indicator.into(), error);
        self
    }

    /// Fail every descriptor whose URL contains `fragment`.
    pub fn with_url_failure(mut self, fragment: impl Into<String>, error: FetchError) -> Self {
        self.url_failures.insert(fragment.into(), error);
        self
    }

    /// Panic when extracting a URL containing `fragment`.
    pub fn with_panic_on(mut self, fragment: impl Into<String>) -> Self {
        self.panic_on = Some(fragment.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// URLs requested so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Highest number of concurrent `extract` calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InsightExtractor for MockExtractor {
    async fn extract(&self, descriptor: &RequestDescriptor) -> FetchResult<ExtractedPayload> {
        lock(&self.calls).push(descriptor.url.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(fragment) = &self.panic_on {
            if descriptor.url.contains(fragment.as_str()) {
                panic!("mock extractor panic for {}", descriptor.url);
            }
        }
        if let Some(error) = self.failures.get(&descriptor.indicator_name) {
            return Err(error.clone());
        }
        if let Some((_, error)) = self
            .url_failures
            .iter()
            .find(|(fragment, _)| descriptor.url.contains(fragment.as_str()))
        {
            return Err(error.clone());
        }

        Ok(ExtractedPayload::json(serde_json::json!({
            "indicator": descriptor.indicator_name,
            "url": descriptor.url,
        })))
    }
}

/// A mock index source whose membership can change between calls.
#[derive(Default)]
pub struct MockIndexSource {
    members: RwLock<HashMap<String, Vec<Symbol>>>,
    calls: AtomicUsize,
}

impl MockIndexSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(self, index_name: impl Into<String>, symbols: &[&str]) -> Self {
        self.set_members(index_name, symbols);
        self
    }

    /// Replace an index's membership.
    pub fn set_members(&self, index_name: impl Into<String>, symbols: &[&str]) {
        let symbols = symbols.iter().filter_map(|s| Symbol::parse(s).ok()).collect();
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index_name.into(), symbols);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexSource for MockIndexSource {
    async fn members(&self, index_name: &str) -> FetchResult<Vec<Symbol>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index_name)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("index {index_name}")))
    }
}

/// A cache store whose every operation fails, for exercising outage paths.
#[derive(Default)]
pub struct FailingStore;

impl FailingStore {
    pub fn new() -> Self {
        Self
    }

    fn unavailable() -> CacheError {
        CacheError::Backend(Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "store unavailable",
        )))
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _ns: Namespace, _key: &str) -> CacheResult<Option<serde_json::Value>> {
        Err(Self::unavailable())
    }

    async fn set(
        &self,
        _ns: Namespace,
        _key: &str,
        _value: serde_json::Value,
        _ttl: Option<Duration>,
    ) -> CacheResult<()> {
        Err(Self::unavailable())
    }

    async fn delete(&self, _ns: Namespace, _key: &str) -> CacheResult<bool> {
        Err(Self::unavailable())
    }

    async fn clear(&self, _ns: Namespace) -> CacheResult<usize> {
        Err(Self::unavailable())
    }

    async fn size(&self, _ns: Namespace) -> CacheResult<usize> {
        Err(Self::unavailable())
    }
}
