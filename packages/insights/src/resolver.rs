//! Symbol -> (pk, slug) resolution, cached without expiry.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::MetadataError;
use crate::traits::{
    source::MetadataSource,
    store::{CacheStore, CacheStoreExt, Namespace},
};
use crate::types::symbol::{Metadata, Symbol};

/// Resolves symbols to their identifiers, consulting the cache first.
///
/// Cache failures never fail a resolution: read errors count as misses and
/// write errors are logged.
#[derive(Clone)]
pub struct MetadataResolver {
    cache: Arc<dyn CacheStore>,
    source: Arc<dyn MetadataSource>,
}

impl MetadataResolver {
    pub fn new(cache: Arc<dyn CacheStore>, source: Arc<dyn MetadataSource>) -> Self {
        Self { cache, source }
    }

    pub async fn resolve(&self, symbol: &Symbol) -> Result<Metadata, MetadataError> {
        match self
            .cache
            .get_json::<Metadata>(Namespace::Metadata, symbol.as_str())
            .await
        {
            Ok(Some(metadata)) if metadata.is_usable() => {
                debug!(symbol = %symbol, "Metadata cache hit");
                return Ok(metadata);
            }
            Ok(_) => debug!(symbol = %symbol, "Metadata cache miss"),
            Err(e) => warn!(symbol = %symbol, error = %e, "Metadata cache read failed, treating as miss"),
        }

        let metadata = match self.source.lookup(symbol).await {
            Ok(Some(metadata)) if metadata.is_usable() => metadata,
            Ok(_) => return Err(MetadataError::MissingMetadata),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Metadata lookup failed");
                return Err(MetadataError::Fetch(e));
            }
        };

        if let Err(e) = self
            .cache
            .set_json(Namespace::Metadata, symbol.as_str(), &metadata, None)
            .await
        {
            warn!(symbol = %symbol, error = %e, "Failed to cache metadata");
        }

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::stores::MemoryStore;
    use crate::testing::{FailingStore, MockMetadataSource};

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = Arc::new(MemoryStore::new());
        let source = Arc::new(MockMetadataSource::new().with_metadata("TCS", "1372", "tcs-ltd"));
        let resolver = MetadataResolver::new(cache.clone(), source.clone());

        let first = resolver.resolve(&sym("TCS")).await.unwrap();
        let second = resolver.resolve(&sym("TCS")).await.unwrap();

        assert_eq!(first, Metadata::new("1372", "tcs-ltd"));
        assert_eq!(first, second);
        assert_eq!(source.lookup_count(), 1);
        assert!(cache.has(Namespace::Metadata, "TCS").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_metadata() {
        let source = Arc::new(MockMetadataSource::new());
        let resolver = MetadataResolver::new(Arc::new(MemoryStore::new()), source);

        assert_eq!(
            resolver.resolve(&sym("NOPE")).await,
            Err(MetadataError::MissingMetadata)
        );
    }

    #[tokio::test]
    async fn test_unusable_metadata_is_missing() {
        let source = Arc::new(MockMetadataSource::new().with_metadata("TCS", "", "tcs-ltd"));
        let resolver = MetadataResolver::new(Arc::new(MemoryStore::new()), source);

        assert_eq!(
            resolver.resolve(&sym("TCS")).await,
            Err(MetadataError::MissingMetadata)
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates_as_value() {
        let source = Arc::new(MockMetadataSource::new().with_failure(
            "TCS",
            FetchError::Timeout {
                url: "https://example.com/TCS".to_string(),
            },
        ));
        let resolver = MetadataResolver::new(Arc::new(MemoryStore::new()), source);

        let err = resolver.resolve(&sym("TCS")).await.unwrap_err();
        assert!(matches!(err, MetadataError::Fetch(FetchError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_broken_cache_still_resolves() {
        let source = Arc::new(MockMetadataSource::new().with_metadata("TCS", "1372", "tcs-ltd"));
        let resolver = MetadataResolver::new(Arc::new(FailingStore::new()), source.clone());

        assert!(resolver.resolve(&sym("TCS")).await.is_ok());
        assert!(resolver.resolve(&sym("TCS")).await.is_ok());
        assert_eq!(source.lookup_count(), 2);
    }
}
