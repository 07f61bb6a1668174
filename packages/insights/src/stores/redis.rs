//! Redis-backed cache store (requires the `redis` feature).
//!
//! Keys are laid out as `<prefix>:<namespace>:<key>`; TTLs use native
//! expiry so expired entries vanish server-side.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::traits::store::{CacheStore, Namespace};

const SCAN_BATCH: usize = 200;

fn backend(e: redis::RedisError) -> CacheError {
    CacheError::Backend(Box::new(e))
}

/// Cache store over a shared multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisStore {
    /// Connect to `url` and namespace every key under `prefix`.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(backend)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)?;
        let prefix = prefix.into();
        debug!(prefix = %prefix, "Connected to Redis cache");
        Ok(Self { conn, prefix })
    }

    fn key(&self, ns: Namespace, key: &str) -> String {
        format!("{}:{}:{}", self.prefix, ns.as_str(), key)
    }

    fn pattern(&self, ns: Namespace) -> String {
        format!("{}:{}:*", self.prefix, ns.as_str())
    }

    /// All keys in a namespace, via incremental SCAN.
    async fn scan(&self, ns: Namespace) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = self.pattern(ns);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, ns: Namespace, key: &str) -> CacheResult<Option<serde_json::Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(ns, key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        ns: Namespace,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(ns, key)).arg(serde_json::to_string(&value)?);
        if let Some(ttl) = ttl {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, ns: Namespace, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let removed: usize = redis::cmd("DEL")
            .arg(self.key(ns, key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(removed > 0)
    }

    async fn clear(&self, ns: Namespace) -> CacheResult<usize> {
        let keys = self.scan(ns).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let mut removed = 0;
        for batch in keys.chunks(SCAN_BATCH) {
            let count: usize = redis::cmd("DEL")
                .arg(batch)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            removed += count;
        }
        debug!(namespace = %ns, removed, "Cleared Redis namespace");
        Ok(removed)
    }

    async fn size(&self, ns: Namespace) -> CacheResult<usize> {
        Ok(self.scan(ns).await?.len())
    }
}
