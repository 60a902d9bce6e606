use super::FeedStore;
use crate::error::Result;
use crate::models::{FeedEntry, NewFeedEntry};
use crate::pagination::CursorParams;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: Vec<FeedEntry>,
}

impl Table {
    fn insert(&mut self, entry: &NewFeedEntry) -> Option<FeedEntry> {
        let exists = self
            .rows
            .iter()
            .any(|row| row.user_id == entry.user_id && row.item_id == entry.item_id);
        if exists {
            return None;
        }

        self.next_id += 1;
        let row = FeedEntry {
            id: self.next_id,
            user_id: entry.user_id,
            item_id: entry.item_id,
            created_at: entry.created_at,
        };
        self.rows.push(row.clone());
        Some(row)
    }
}

/// Feed entries kept in process memory, with the same uniqueness and
/// ordering rules as the `newsfeeds` table.
#[derive(Default)]
pub struct MemoryFeedStore {
    table: RwLock<Table>,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn count_for_item(&self, item_id: i64) -> usize {
        self.table
            .read()
            .await
            .rows
            .iter()
            .filter(|row| row.item_id == item_id)
            .count()
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn insert(&self, entry: &NewFeedEntry) -> Result<Option<FeedEntry>> {
        Ok(self.table.write().await.insert(entry))
    }

    async fn bulk_insert(&self, entries: &[NewFeedEntry]) -> Result<Vec<FeedEntry>> {
        let mut table = self.table.write().await;
        Ok(entries.iter().filter_map(|entry| table.insert(entry)).collect())
    }

    async fn list(
        &self,
        user_id: i64,
        params: &CursorParams,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>> {
        let table = self.table.read().await;
        let mut rows: Vec<FeedEntry> = table
            .rows
            .iter()
            .filter(|row| row.user_id == user_id && params.matches(*row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn delete_for_item(&self, item_id: i64) -> Result<Vec<i64>> {
        let mut table = self.table.write().await;
        let user_ids = table
            .rows
            .iter()
            .filter(|row| row.item_id == item_id)
            .map(|row| row.user_id)
            .collect();
        table.rows.retain(|row| row.item_id != item_id);
        Ok(user_ids)
    }
}
