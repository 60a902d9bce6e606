//! In-memory wiring of the whole feed engine for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feed_service::cache::backend::ListBackend;
use feed_service::cache::{BoundedCache, CacheSettings, MemoryListBackend};
use feed_service::db::{FeedStore, MemoryFeedStore};
use feed_service::error::{AppError, CacheError, CacheResult, Result};
use feed_service::fanout::{
    BatchWriter, DispatchMode, FanoutPipeline, FanoutQueue, Planner, QueueSettings,
};
use feed_service::graph::{FollowerProvider, WideColumnGraph};
use feed_service::models::{FeedEntry, FeedItem, NewFeedEntry};
use feed_service::pagination::{CursorParams, Paginator};
use feed_service::services::{FeedService, MemoryItemProvider, TimelineService};
use wide_column::{InMemoryBackend, TableNamespace, WideColumnStore};

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn item(id: i64, author_id: i64, secs: i64) -> FeedItem {
    FeedItem {
        id,
        author_id,
        created_at: at(secs),
    }
}

pub fn cache_settings(capacity: usize) -> CacheSettings {
    CacheSettings {
        capacity,
        ttl: Duration::from_secs(60),
        op_timeout: Duration::from_millis(500),
    }
}

pub fn eager_queue() -> QueueSettings {
    QueueSettings {
        mode: DispatchMode::Eager,
        workers: 1,
        capacity: 16,
        max_attempts: 3,
        retry_backoff: Duration::from_millis(1),
    }
}

pub fn background_queue(max_attempts: u32) -> QueueSettings {
    QueueSettings {
        mode: DispatchMode::Background,
        workers: 2,
        capacity: 16,
        max_attempts,
        retry_backoff: Duration::from_millis(1),
    }
}

pub struct Harness {
    pub store: Arc<dyn FeedStore>,
    pub lists: Arc<MemoryListBackend>,
    pub graph: Arc<WideColumnGraph>,
    pub items: Arc<MemoryItemProvider>,
    pub feeds: FeedService,
    pub timelines: TimelineService,
}

pub struct HarnessBuilder {
    store: Arc<dyn FeedStore>,
    list_backend: Option<Arc<dyn ListBackend>>,
    followers: Option<Arc<dyn FollowerProvider>>,
    capacity: usize,
    page_size: usize,
    batch_size: usize,
    queue: QueueSettings,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryFeedStore::new()),
            list_backend: None,
            followers: None,
            capacity: 20,
            page_size: 20,
            batch_size: 1000,
            queue: eager_queue(),
        }
    }

    pub fn store(mut self, store: Arc<dyn FeedStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the in-memory lists for every cache in the harness.
    pub fn list_backend(mut self, backend: Arc<dyn ListBackend>) -> Self {
        self.list_backend = Some(backend);
        self
    }

    /// Replaces the graph as the follower source for fanout.
    pub fn followers(mut self, followers: Arc<dyn FollowerProvider>) -> Self {
        self.followers = Some(followers);
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn queue(mut self, queue: QueueSettings) -> Self {
        self.queue = queue;
        self
    }

    pub async fn build(self) -> Harness {
        let lists = Arc::new(MemoryListBackend::new());
        let backend: Arc<dyn ListBackend> = match self.list_backend {
            Some(backend) => backend,
            None => lists.clone(),
        };
        let feed_cache: BoundedCache<FeedEntry> =
            BoundedCache::new(backend.clone(), cache_settings(self.capacity));
        let item_cache: BoundedCache<FeedItem> =
            BoundedCache::new(backend, cache_settings(self.capacity));

        let graph = Arc::new(WideColumnGraph::new(WideColumnStore::new(
            Arc::new(InMemoryBackend::new()),
            TableNamespace::Prefixed("test_".into()),
        )));
        graph.ensure_tables().await.unwrap();

        let followers: Arc<dyn FollowerProvider> = match self.followers {
            Some(followers) => followers,
            None => graph.clone(),
        };
        let queue = FanoutQueue::start(
            BatchWriter::new(Arc::clone(&self.store), feed_cache.clone()),
            Planner::new(followers, self.batch_size),
            self.queue,
        );
        let fanout = FanoutPipeline::new(Arc::clone(&self.store), feed_cache.clone(), queue);
        let paginator = Paginator::new(self.page_size);
        let items = Arc::new(MemoryItemProvider::new());

        Harness {
            feeds: FeedService::new(Arc::clone(&self.store), feed_cache, paginator, fanout),
            timelines: TimelineService::new(items.clone(), item_cache, paginator),
            store: self.store,
            lists,
            graph,
            items,
        }
    }
}

impl Harness {
    pub async fn follow(&self, follower: i64, author: i64) {
        self.graph.follow(follower, author, at(0)).await.unwrap();
    }

    /// Every entry of a feed, walking pages with id tie-break cursors.
    pub async fn read_all(&self, user_id: i64) -> Vec<FeedEntry> {
        let mut all = Vec::new();
        let mut params = CursorParams::First;
        loop {
            let page = self.feeds.get_page(user_id, &params).await.unwrap();
            all.extend(page.items.iter().cloned());
            if !page.has_next_page {
                return all;
            }
            let last = page.items.last().unwrap();
            params = CursorParams::Before(feed_service::Cursor::with_id(last.created_at, last.id));
        }
    }
}

/// Every call fails as if Redis were unreachable.
pub struct UnreachableLists;

#[async_trait]
impl ListBackend for UnreachableLists {
    async fn read(&self, _key: &str) -> CacheResult<Option<Vec<String>>> {
        Err(CacheError::Timeout(0))
    }

    async fn populate_if_absent(&self, _key: &str, _values: &[String], _ttl: Duration) -> CacheResult<bool> {
        Err(CacheError::Timeout(0))
    }

    async fn push_if_present(
        &self,
        _key: &str,
        _value: &str,
        _capacity: usize,
        _ttl: Duration,
    ) -> CacheResult<bool> {
        Err(CacheError::Timeout(0))
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::Timeout(0))
    }
}

/// In-memory lists whose deletes can be switched to fail.
#[derive(Default)]
pub struct BrittleDeletes {
    inner: MemoryListBackend,
    failing: AtomicBool,
}

impl BrittleDeletes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deletes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListBackend for BrittleDeletes {
    async fn read(&self, key: &str) -> CacheResult<Option<Vec<String>>> {
        self.inner.read(key).await
    }

    async fn populate_if_absent(&self, key: &str, values: &[String], ttl: Duration) -> CacheResult<bool> {
        self.inner.populate_if_absent(key, values, ttl).await
    }

    async fn push_if_present(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl: Duration,
    ) -> CacheResult<bool> {
        self.inner.push_if_present(key, value, capacity, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Timeout(0));
        }
        self.inner.delete(key).await
    }
}

/// Durable store whose bulk inserts fail a fixed number of times before
/// succeeding.
pub struct FlakyStore {
    inner: MemoryFeedStore,
    remaining_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn failing(times: usize) -> Self {
        Self {
            inner: MemoryFeedStore::new(),
            remaining_failures: AtomicUsize::new(times),
        }
    }

    pub async fn count(&self) -> usize {
        self.inner.count().await
    }
}

#[async_trait]
impl FeedStore for FlakyStore {
    async fn insert(&self, entry: &NewFeedEntry) -> Result<Option<FeedEntry>> {
        self.inner.insert(entry).await
    }

    async fn bulk_insert(&self, entries: &[NewFeedEntry]) -> Result<Vec<FeedEntry>> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AppError::Internal("connection reset".to_string()));
        }
        self.inner.bulk_insert(entries).await
    }

    async fn list(
        &self,
        user_id: i64,
        params: &CursorParams,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>> {
        self.inner.list(user_id, params, limit).await
    }

    async fn delete_for_item(&self, item_id: i64) -> Result<Vec<i64>> {
        self.inner.delete_for_item(item_id).await
    }
}

/// Follower source that takes a fixed time to answer.
pub struct SlowFollowers {
    pub followers: Vec<i64>,
    pub delay: Duration,
}

#[async_trait]
impl FollowerProvider for SlowFollowers {
    async fn follower_ids(&self, _author_id: i64) -> Result<Vec<i64>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.followers.clone())
    }
}
