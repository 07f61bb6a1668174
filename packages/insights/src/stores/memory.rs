//! In-memory cache store for tests, development and single-process workers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::CacheResult;
use crate::traits::store::{CacheStore, Namespace};

struct Entry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory cache store.
///
/// Expired entries are evicted lazily when read, and skipped by
/// `size`/`clear`. Data is lost on restart.
pub struct MemoryStore {
    entries: RwLock<HashMap<(Namespace, String), Entry>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries across all namespaces, expired ones included.
    pub fn raw_len(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<(Namespace, String), Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<(Namespace, String), Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, ns: Namespace, key: &str) -> CacheResult<Option<serde_json::Value>> {
        let now = Instant::now();
        let id = (ns, key.to_string());
        {
            let entries = self.read();
            match entries.get(&id) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict unless a concurrent writer refreshed it
        let mut entries = self.write();
        if entries.get(&id).is_some_and(|e| !e.is_live(now)) {
            entries.remove(&id);
        }
        Ok(None)
    }

    async fn set(
        &self,
        ns: Namespace,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.write()
            .insert((ns, key.to_string()), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, ns: Namespace, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        let removed = self.write().remove(&(ns, key.to_string()));
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    async fn clear(&self, ns: Namespace) -> CacheResult<usize> {
        let now = Instant::now();
        let mut entries = self.write();
        let mut removed = 0;
        entries.retain(|(entry_ns, _), entry| {
            if *entry_ns != ns {
                return true;
            }
            if entry.is_live(now) {
                removed += 1;
            }
            false
        });
        Ok(removed)
    }

    async fn size(&self, ns: Namespace) -> CacheResult<usize> {
        let now = Instant::now();
        Ok(self
            .read()
            .iter()
            .filter(|((entry_ns, _), entry)| *entry_ns == ns && entry.is_live(now))
            .count())
    }
}
