//! Namespaced key/value cache with TTL.
//!
//! One store backs four independent namespaces:
//! - `metadata`: symbol -> (pk, slug), no expiry
//! - `results`: symbol -> cached extraction results
//! - `jobs`: job id -> job record
//! - `batch_state`: index name -> resumable progress

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::CacheResult;

/// Cache namespace. Keys never collide across namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Metadata,
    Results,
    Jobs,
    BatchState,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Metadata,
        Namespace::Results,
        Namespace::Jobs,
        Namespace::BatchState,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Metadata => "metadata",
            Namespace::Results => "results",
            Namespace::Jobs => "jobs",
            Namespace::BatchState => "batch_state",
        }
    }

    /// Parse a namespace name as used on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.as_str() == name)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asynchronous cache store.
///
/// Implementations must be safe for concurrent use; concurrent writes to one
/// key resolve last-write-wins. Expired entries behave as absent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value, or None if absent or expired.
    async fn get(&self, ns: Namespace, key: &str) -> CacheResult<Option<serde_json::Value>>;

    /// Store a value, optionally expiring after `ttl`.
    async fn set(
        &self,
        ns: Namespace,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()>;

    /// Whether a live value exists.
    async fn has(&self, ns: Namespace, key: &str) -> CacheResult<bool> {
        Ok(self.get(ns, key).await?.is_some())
    }

    /// Remove a key. Returns whether a live value was removed.
    async fn delete(&self, ns: Namespace, key: &str) -> CacheResult<bool>;

    /// Remove every key in a namespace. Returns the number removed.
    async fn clear(&self, ns: Namespace) -> CacheResult<usize>;

    /// Number of live keys in a namespace.
    async fn size(&self, ns: Namespace) -> CacheResult<usize>;
}

/// Typed access layered over [`CacheStore`].
#[async_trait]
pub trait CacheStoreExt: CacheStore {
    async fn get_json<T>(&self, ns: Namespace, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(ns, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T>(
        &self,
        ns: Namespace,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        self.set(ns, key, value, ttl).await
    }
}

impl<S: CacheStore + ?Sized> CacheStoreExt for S {}
