use crate::cache::keys::newsfeed_key;
use crate::cache::BoundedCache;
use crate::db::{FeedStore, UserFeed};
use crate::error::Result;
use crate::metrics::feed::FANOUT_ENTRIES_TOTAL;
use crate::models::{FeedEntry, FeedItem, NewFeedEntry};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Concurrent cache pushes per batch
const PUSH_CONCURRENCY: usize = 32;

/// One unit of follower fanout: an item and a slice of its recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutBatch {
    pub item: FeedItem,
    pub recipient_ids: Vec<i64>,
    /// Zero on first delivery
    pub attempt: u32,
}

impl FanoutBatch {
    pub fn split(item: &FeedItem, recipient_ids: &[i64], batch_size: usize) -> Vec<FanoutBatch> {
        recipient_ids
            .chunks(batch_size.max(1))
            .map(|chunk| FanoutBatch {
                item: item.clone(),
                recipient_ids: chunk.to_vec(),
                attempt: 0,
            })
            .collect()
    }

    pub fn retry(&self) -> FanoutBatch {
        FanoutBatch {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Writes a batch durably, then pushes the new rows into recipients' caches.
#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn FeedStore>,
    cache: BoundedCache<FeedEntry>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn FeedStore>, cache: BoundedCache<FeedEntry>) -> Self {
        Self { store, cache }
    }

    /// Returns the number of entries created by this delivery. A redelivered
    /// batch creates and pushes nothing for pairs that already exist.
    pub async fn write(&self, batch: &FanoutBatch) -> Result<usize> {
        let entries: Vec<NewFeedEntry> = batch
            .recipient_ids
            .iter()
            .map(|user_id| NewFeedEntry::for_recipient(&batch.item, *user_id))
            .collect();

        let inserted = self.store.bulk_insert(&entries).await?;

        stream::iter(inserted.iter())
            .for_each_concurrent(PUSH_CONCURRENCY, |entry| self.push(entry))
            .await;

        FANOUT_ENTRIES_TOTAL.inc_by(inserted.len() as u64);
        debug!(
            item_id = batch.item.id,
            recipients = batch.recipient_ids.len(),
            inserted = inserted.len(),
            attempt = batch.attempt,
            "Fanout batch written"
        );
        Ok(inserted.len())
    }

    async fn push(&self, entry: &FeedEntry) {
        let source = UserFeed::new(Arc::clone(&self.store), entry.user_id);
        if let Err(e) = self
            .cache
            .push_and_trim(&newsfeed_key(entry.user_id), entry, &source)
            .await
        {
            warn!(
                user_id = entry.user_id,
                item_id = entry.item_id,
                error = %e,
                "Cache push after fanout failed, feed will backfill on read"
            );
        }
    }
}
