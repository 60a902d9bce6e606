//! Push-model fanout
//!
//! Publishing an item writes the author's own feed entry synchronously, then
//! schedules a plan job on the `FanoutQueue`. The plan enumerates the
//! followers off the request path and splits them into fixed-size batches.
//! Each batch is written durably and then pushed into its recipients'
//! caches; the uniqueness of `(user_id, item_id)` makes every batch safe to
//! redeliver.

pub mod batch;
pub mod plan;
pub mod queue;

use crate::cache::keys::newsfeed_key;
use crate::cache::BoundedCache;
use crate::db::{FeedStore, UserFeed};
use crate::error::Result;
use crate::models::{FeedEntry, FeedItem, NewFeedEntry};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

pub use batch::{BatchWriter, FanoutBatch};
pub use plan::{FanoutPlan, Planner};
pub use queue::{DispatchMode, FanoutJob, FanoutQueue, FanoutStats, QueueSettings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
    pub item_id: i64,
    /// `None` when the author already had this item
    pub self_entry: Option<FeedEntry>,
}

#[derive(Clone)]
pub struct FanoutPipeline {
    store: Arc<dyn FeedStore>,
    cache: BoundedCache<FeedEntry>,
    queue: FanoutQueue,
}

impl FanoutPipeline {
    pub fn new(store: Arc<dyn FeedStore>, cache: BoundedCache<FeedEntry>, queue: FanoutQueue) -> Self {
        Self { store, cache, queue }
    }

    pub fn queue(&self) -> &FanoutQueue {
        &self.queue
    }

    pub async fn run(&self, item: &FeedItem) -> Result<FanoutReport> {
        let self_entry = self
            .store
            .insert(&NewFeedEntry::for_recipient(item, item.author_id))
            .await?;

        match &self_entry {
            Some(entry) => {
                let source = UserFeed::new(Arc::clone(&self.store), item.author_id);
                self.cache
                    .push_and_trim(&newsfeed_key(item.author_id), entry, &source)
                    .await?;
            }
            None => debug!(
                item_id = item.id,
                author_id = item.author_id,
                "Author entry already present"
            ),
        }

        self.queue.schedule(item).await?;
        info!(item_id = item.id, author_id = item.author_id, "Fanout scheduled");

        Ok(FanoutReport {
            item_id: item.id,
            self_entry,
        })
    }
}
