//! List storage behind `BoundedCache`
//!
//! Every mutating call is a single atomic unit on the server: populate-if-
//! absent, push-and-trim-if-present and delete. An empty list is
//! the same as a missing key.

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait ListBackend: Send + Sync {
    /// Whole list, head first. `None` when the key does not exist.
    async fn read(&self, key: &str) -> CacheResult<Option<Vec<String>>>;

    /// Writes `values` (head first) only if the key does not exist yet.
    /// Returns whether this call populated the key.
    async fn populate_if_absent(&self, key: &str, values: &[String], ttl: Duration)
        -> CacheResult<bool>;

    /// Pushes `value` at the head and trims to `capacity`, only if the key
    /// exists. Returns whether the push happened.
    async fn push_if_present(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl: Duration,
    ) -> CacheResult<bool>;

    async fn delete(&self, key: &str) -> CacheResult<()>;
}

const POPULATE_IF_ABSENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
for i = 2, #ARGV do
    redis.call('RPUSH', KEYS[1], ARGV[i])
end
redis.call('EXPIRE', KEYS[1], ARGV[1])
return 1
"#;

const PUSH_IF_PRESENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('LPUSH', KEYS[1], ARGV[1])
redis.call('LTRIM', KEYS[1], 0, tonumber(ARGV[2]) - 1)
redis.call('EXPIRE', KEYS[1], ARGV[3])
return 1
"#;

/// Redis lists. Scripts keep each mutation atomic across processes.
#[derive(Clone)]
pub struct RedisListBackend {
    manager: ConnectionManager,
    populate_if_absent: Script,
    push_if_present: Script,
}

impl RedisListBackend {
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager))
    }

    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            populate_if_absent: Script::new(POPULATE_IF_ABSENT),
            push_if_present: Script::new(PUSH_IF_PRESENT),
        }
    }

    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl ListBackend for RedisListBackend {
    async fn read(&self, key: &str) -> CacheResult<Option<Vec<String>>> {
        let mut conn = self.manager.clone();
        let (exists, values): (bool, Vec<String>) = redis::pipe()
            .atomic()
            .exists(key)
            .lrange(key, 0, -1)
            .query_async(&mut conn)
            .await?;

        Ok(if exists { Some(values) } else { None })
    }

    async fn populate_if_absent(
        &self,
        key: &str,
        values: &[String],
        ttl: Duration,
    ) -> CacheResult<bool> {
        if values.is_empty() {
            return Ok(false);
        }

        let mut conn = self.manager.clone();
        let written: i32 = self
            .populate_if_absent
            .key(key)
            .arg(ttl.as_secs().max(1))
            .arg(values)
            .invoke_async(&mut conn)
            .await?;
        debug!(key = %key, rows = values.len(), written = written == 1, "Populate list");
        Ok(written == 1)
    }

    async fn push_if_present(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let mut conn = self.manager.clone();
        let pushed: i32 = self
            .push_if_present
            .key(key)
            .arg(value)
            .arg(capacity.max(1))
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(pushed == 1)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(CacheError::from)
    }
}

/// Process-local lists for tests and single-node runs. Expiry is not
/// modeled.
#[derive(Default)]
pub struct MemoryListBackend {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryListBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every list, like a cache flush or restart.
    pub async fn clear(&self) {
        self.lists.lock().await.clear();
    }

    pub async fn len(&self, key: &str) -> Option<usize> {
        self.lists.lock().await.get(key).map(VecDeque::len)
    }
}

#[async_trait]
impl ListBackend for MemoryListBackend {
    async fn read(&self, key: &str) -> CacheResult<Option<Vec<String>>> {
        let lists = self.lists.lock().await;
        Ok(lists.get(key).map(|list| list.iter().cloned().collect()))
    }

    async fn populate_if_absent(
        &self,
        key: &str,
        values: &[String],
        _ttl: Duration,
    ) -> CacheResult<bool> {
        let mut lists = self.lists.lock().await;
        if values.is_empty() || lists.contains_key(key) {
            return Ok(false);
        }
        lists.insert(key.to_string(), values.iter().cloned().collect());
        Ok(true)
    }

    async fn push_if_present(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        _ttl: Duration,
    ) -> CacheResult<bool> {
        let mut lists = self.lists.lock().await;
        let Some(list) = lists.get_mut(key) else {
            return Ok(false);
        };
        list.push_front(value.to_string());
        list.truncate(capacity.max(1));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.lists.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_populate_only_once() {
        let backend = MemoryListBackend::new();
        let first = vec!["a".to_string(), "b".to_string()];
        assert!(backend.populate_if_absent("k", &first, TTL).await.unwrap());
        assert!(!backend
            .populate_if_absent("k", &["z".to_string()], TTL)
            .await
            .unwrap());
        assert_eq!(backend.read("k").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_empty_populate_leaves_key_absent() {
        let backend = MemoryListBackend::new();
        assert!(!backend.populate_if_absent("k", &[], TTL).await.unwrap());
        assert_eq!(backend.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_push_requires_existing_key_and_trims() {
        let backend = MemoryListBackend::new();
        assert!(!backend.push_if_present("k", "x", 2, TTL).await.unwrap());

        backend
            .populate_if_absent("k", &["b".to_string(), "a".to_string()], TTL)
            .await
            .unwrap();
        assert!(backend.push_if_present("k", "c", 2, TTL).await.unwrap());
        assert_eq!(
            backend.read("k").await.unwrap(),
            Some(vec!["c".to_string(), "b".to_string()])
        );
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let backend = MemoryListBackend::new();
        backend
            .populate_if_absent("k", &["a".to_string()], TTL)
            .await
            .unwrap();
        backend.clear().await;
        assert_eq!(backend.len("k").await, None);
    }
}
