use super::cached_page;
use crate::cache::keys::newsfeed_key;
use crate::cache::BoundedCache;
use crate::db::{FeedStore, UserFeed};
use crate::error::Result;
use crate::fanout::{FanoutPipeline, FanoutReport, FanoutStats};
use crate::models::{FeedEntry, FeedItem, FeedPage};
use crate::pagination::{CursorParams, Paginator};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// Entry point for reading and distributing newsfeeds.
#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn FeedStore>,
    cache: BoundedCache<FeedEntry>,
    paginator: Paginator,
    fanout: FanoutPipeline,
}

impl FeedService {
    pub fn new(
        store: Arc<dyn FeedStore>,
        cache: BoundedCache<FeedEntry>,
        paginator: Paginator,
        fanout: FanoutPipeline,
    ) -> Self {
        Self {
            store,
            cache,
            paginator,
            fanout,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_page(&self, user_id: i64, params: &CursorParams) -> Result<FeedPage<FeedEntry>> {
        let source = UserFeed::new(Arc::clone(&self.store), user_id);
        cached_page(
            &self.cache,
            &newsfeed_key(user_id),
            &source,
            &self.paginator,
            params,
        )
        .await
    }

    /// Writes the author's entry and schedules follower fanout.
    #[instrument(skip(self, item), fields(item_id = item.id, author_id = item.author_id))]
    pub async fn distribute(&self, item: &FeedItem) -> Result<FanoutReport> {
        self.fanout.run(item).await
    }

    /// Deletes every feed entry of an item and drops the affected cached
    /// feeds. Returns the number of recipients touched.
    #[instrument(skip(self))]
    pub async fn retract(&self, item_id: i64) -> Result<usize> {
        let recipients: BTreeSet<i64> = self
            .store
            .delete_for_item(item_id)
            .await?
            .into_iter()
            .collect();

        for user_id in &recipients {
            self.cache.invalidate(&newsfeed_key(*user_id)).await?;
        }

        info!(item_id, recipients = recipients.len(), "Item retracted from feeds");
        Ok(recipients.len())
    }

    pub fn fanout_stats(&self) -> FanoutStats {
        self.fanout.queue().stats()
    }

    pub fn fanout(&self) -> &FanoutPipeline {
        &self.fanout
    }
}
