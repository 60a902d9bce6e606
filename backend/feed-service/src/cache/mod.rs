//! Bounded, newest-first row cache
//!
//! Each owner key maps to a list holding exactly the newest
//! `min(capacity, total)` rows of its durable source, in order. The list is
//! only ever created whole (backfill) or extended at the head (push); any
//! change that cannot keep it an exact prefix drops the key instead, and the
//! next read backfills it.
//!
//! Reads fail open: cache errors are counted and treated as misses. Durable
//! source errors always propagate.

pub mod backend;
pub mod keys;

use crate::error::{CacheError, CacheResult, Result};
use crate::metrics::feed::{record_cache_event, record_cache_write};
use crate::pagination::{is_newer, OrderedSource, Timestamped};
use backend::ListBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

pub use backend::{MemoryListBackend, RedisListBackend};

const LOCK_STRIPES: usize = 64;

/// Rows that can live in a `BoundedCache`.
pub trait CachedRow:
    Timestamped + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> CachedRow for T where
    T: Timestamped + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: usize,
    pub ttl: Duration,
    pub op_timeout: Duration,
}

/// Serializes backfills and pushes per key within this process.
struct KeyLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyLocks {
    fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.stripes.len();
        self.stripes[index].lock().await
    }
}

pub struct BoundedCache<T> {
    backend: Arc<dyn ListBackend>,
    settings: CacheSettings,
    locks: Arc<KeyLocks>,
    _rows: PhantomData<fn() -> T>,
}

impl<T> Clone for BoundedCache<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            settings: self.settings.clone(),
            locks: Arc::clone(&self.locks),
            _rows: PhantomData,
        }
    }
}

impl<T: CachedRow> BoundedCache<T> {
    pub fn new(backend: Arc<dyn ListBackend>, settings: CacheSettings) -> Self {
        Self {
            backend,
            settings,
            locks: Arc::new(KeyLocks::new()),
            _rows: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity
    }

    /// Cached rows for `key`, or `None` on a miss or any cache failure.
    pub async fn load(&self, key: &str) -> Option<Vec<T>> {
        match self.read(key).await {
            Ok(Some(rows)) => {
                record_cache_event("hit");
                debug!(key = %key, rows = rows.len(), "Cache hit");
                Some(rows)
            }
            Ok(None) => {
                record_cache_event("miss");
                debug!(key = %key, "Cache miss");
                None
            }
            Err(CacheError::Serialization(e)) => {
                record_cache_event("corrupt");
                warn!(key = %key, error = %e, "Discarding undecodable cached list");
                self.discard(key).await;
                None
            }
            Err(e) => {
                record_cache_event("error");
                warn!(key = %key, error = %e, "Cache read failed, falling back to durable store");
                None
            }
        }
    }

    /// Returns the cached list, backfilling it from `source` on a miss.
    ///
    /// Concurrent misses on one key in this process run a single backfill;
    /// across processes the populate is conditional, so the first writer wins
    /// and later ones leave its list alone.
    pub async fn load_or_backfill(
        &self,
        key: &str,
        source: &dyn OrderedSource<T>,
    ) -> Result<Vec<T>> {
        if let Some(rows) = self.load(key).await {
            return Ok(rows);
        }

        let _guard = self.locks.lock(key).await;
        if let Ok(Some(rows)) = self.read(key).await {
            return Ok(rows);
        }

        let rows = source.newest(self.settings.capacity).await?;
        self.populate(key, &rows).await;
        Ok(rows)
    }

    /// Records that `row` was durably written for `key`.
    ///
    /// A cached list gets the row at its head and is trimmed to capacity. A
    /// missing list is backfilled from `source`, which already holds the row.
    /// Rows older than the cached head force a rebuild, unless they fall
    /// below a full window.
    pub async fn push_and_trim(
        &self,
        key: &str,
        row: &T,
        source: &dyn OrderedSource<T>,
    ) -> Result<()> {
        let _guard = self.locks.lock(key).await;

        let cached = match self.read(key).await {
            Ok(Some(cached)) => cached,
            Ok(None) => return self.backfill_locked(key, source).await,
            Err(e) => {
                record_cache_write("push", "error");
                warn!(key = %key, error = %e, "Cache read before push failed, dropping key");
                self.discard(key).await;
                return Ok(());
            }
        };

        if cached
            .iter()
            .any(|r| r.row_id() == row.row_id() && r.created_at() == row.created_at())
        {
            record_cache_write("push", "skipped");
            return Ok(());
        }

        let newest = cached.first().map_or(true, |head| is_newer(row, head));
        if newest {
            return self.push_head(key, row, source).await;
        }

        let below_window = cached.len() >= self.settings.capacity
            && cached.last().map_or(false, |tail| is_newer(tail, row));
        if below_window {
            record_cache_write("push", "skipped");
            return Ok(());
        }

        debug!(key = %key, "Out-of-order row, rebuilding cached list");
        self.discard(key).await;
        self.backfill_locked(key, source).await
    }

    /// Drops the cached list. Errors are returned, since a caller that
    /// invalidates after a delete cannot leave the stale list behind silently.
    ///
    /// Holds the key lock, so a backfill that read durable rows before the
    /// delete finishes first and is then dropped.
    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        let _guard = self.locks.lock(key).await;
        match self.call(self.backend.delete(key)).await {
            Ok(()) => {
                record_cache_write("invalidate", "success");
                debug!(key = %key, "Invalidated cached list");
                Ok(())
            }
            Err(e) => {
                record_cache_write("invalidate", "error");
                Err(e)
            }
        }
    }

    async fn push_head(&self, key: &str, row: &T, source: &dyn OrderedSource<T>) -> Result<()> {
        let value = match serde_json::to_string(row) {
            Ok(value) => value,
            Err(e) => {
                record_cache_write("push", "error");
                warn!(key = %key, error = %e, "Cannot serialize row, dropping key");
                self.discard(key).await;
                return Ok(());
            }
        };

        let pushed = self
            .call(self.backend.push_if_present(
                key,
                &value,
                self.settings.capacity,
                self.settings.ttl,
            ))
            .await;

        match pushed {
            Ok(true) => {
                record_cache_write("push", "success");
                Ok(())
            }
            // expired between read and push
            Ok(false) => self.backfill_locked(key, source).await,
            Err(e) => {
                record_cache_write("push", "error");
                warn!(key = %key, error = %e, "Cache push failed, dropping key");
                self.discard(key).await;
                Ok(())
            }
        }
    }

    async fn backfill_locked(&self, key: &str, source: &dyn OrderedSource<T>) -> Result<()> {
        let rows = source.newest(self.settings.capacity).await?;
        self.populate(key, &rows).await;
        Ok(())
    }

    /// Best-effort conditional populate. An empty row set leaves the key
    /// absent.
    async fn populate(&self, key: &str, rows: &[T]) {
        if rows.is_empty() {
            record_cache_write("backfill", "skipped");
            return;
        }

        let values = match rows
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()
        {
            Ok(values) => values,
            Err(e) => {
                record_cache_write("backfill", "error");
                warn!(key = %key, error = %e, "Cannot serialize rows for backfill");
                return;
            }
        };

        match self
            .call(self.backend.populate_if_absent(key, &values, self.settings.ttl))
            .await
        {
            Ok(true) => {
                record_cache_write("backfill", "success");
                debug!(key = %key, rows = rows.len(), "Backfilled cached list");
            }
            Ok(false) => record_cache_write("backfill", "skipped"),
            Err(e) => {
                record_cache_write("backfill", "error");
                warn!(key = %key, error = %e, "Cache backfill failed");
            }
        }
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.call(self.backend.delete(key)).await {
            warn!(key = %key, error = %e, "Failed to drop cached list");
        }
    }

    async fn read(&self, key: &str) -> CacheResult<Option<Vec<T>>> {
        let Some(values) = self.call(self.backend.read(key)).await? else {
            return Ok(None);
        };
        if values.is_empty() {
            return Ok(None);
        }

        let rows = values
            .iter()
            .map(|value| serde_json::from_str(value))
            .collect::<std::result::Result<Vec<T>, _>>()?;
        Ok(Some(rows))
    }

    async fn call<R>(&self, op: impl Future<Output = CacheResult<R>>) -> CacheResult<R> {
        match tokio::time::timeout(self.settings.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(
                self.settings.op_timeout.as_millis() as u64,
            )),
        }
    }
}
