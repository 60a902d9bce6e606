//! Author timelines: the items one user has published, newest first,
//! served through the same bounded cache and cursor rules as feeds.

use super::cached_page;
use crate::cache::keys::user_items_key;
use crate::cache::BoundedCache;
use crate::error::Result;
use crate::models::{FeedItem, FeedPage};
use crate::pagination::{CursorParams, OrderedSource, Paginator};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read access to published items, owned by the content system.
#[async_trait]
pub trait ItemProvider: Send + Sync {
    /// Items of `author_id` matching `params`, newest first.
    async fn items_by_author(
        &self,
        author_id: i64,
        params: &CursorParams,
        limit: Option<usize>,
    ) -> Result<Vec<FeedItem>>;
}

#[derive(Default)]
struct ItemLog {
    live: Vec<FeedItem>,
    retracted: HashMap<i64, FeedItem>,
}

/// Items recorded in process memory. Retracted items are kept as
/// tombstones: hidden from reads, but still resolvable by id.
#[derive(Default)]
pub struct MemoryItemProvider {
    log: RwLock<ItemLog>,
}

impl MemoryItemProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an item; an id that is already known is left as is.
    pub async fn record(&self, item: FeedItem) {
        let mut log = self.log.write().await;
        let known = log.retracted.contains_key(&item.id)
            || log.live.iter().any(|live| live.id == item.id);
        if !known {
            log.live.push(item);
        }
    }

    /// Hides the item from reads and returns it. Repeated calls return the
    /// same item, so cleanup that failed halfway can be run again.
    pub async fn retract(&self, item_id: i64) -> Option<FeedItem> {
        let mut log = self.log.write().await;
        if let Some(index) = log.live.iter().position(|item| item.id == item_id) {
            let item = log.live.remove(index);
            log.retracted.insert(item_id, item.clone());
            return Some(item);
        }
        log.retracted.get(&item_id).cloned()
    }
}

#[async_trait]
impl ItemProvider for MemoryItemProvider {
    async fn items_by_author(
        &self,
        author_id: i64,
        params: &CursorParams,
        limit: Option<usize>,
    ) -> Result<Vec<FeedItem>> {
        let log = self.log.read().await;
        let mut matching: Vec<FeedItem> = log
            .live
            .iter()
            .filter(|item| item.author_id == author_id && params.matches(*item))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }
}

struct AuthorItems {
    items: Arc<dyn ItemProvider>,
    author_id: i64,
}

#[async_trait]
impl OrderedSource<FeedItem> for AuthorItems {
    async fn fetch(&self, params: &CursorParams, limit: Option<usize>) -> Result<Vec<FeedItem>> {
        self.items
            .items_by_author(self.author_id, params, limit)
            .await
    }
}

#[derive(Clone)]
pub struct TimelineService {
    items: Arc<dyn ItemProvider>,
    cache: BoundedCache<FeedItem>,
    paginator: Paginator,
}

impl TimelineService {
    pub fn new(
        items: Arc<dyn ItemProvider>,
        cache: BoundedCache<FeedItem>,
        paginator: Paginator,
    ) -> Self {
        Self {
            items,
            cache,
            paginator,
        }
    }

    pub async fn get_page(&self, author_id: i64, params: &CursorParams) -> Result<FeedPage<FeedItem>> {
        cached_page(
            &self.cache,
            &user_items_key(author_id),
            &self.source(author_id),
            &self.paginator,
            params,
        )
        .await
    }

    /// Call after the item is visible through the provider.
    pub async fn record_published(&self, item: &FeedItem) -> Result<()> {
        self.cache
            .push_and_trim(&user_items_key(item.author_id), item, &self.source(item.author_id))
            .await
    }

    /// Call after the item is gone from the provider.
    pub async fn record_removed(&self, item: &FeedItem) -> Result<()> {
        self.cache.invalidate(&user_items_key(item.author_id)).await?;
        Ok(())
    }

    fn source(&self, author_id: i64) -> AuthorItems {
        AuthorItems {
            items: Arc::clone(&self.items),
            author_id,
        }
    }
}
