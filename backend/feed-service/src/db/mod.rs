pub mod feed_repo;
pub mod memory;
pub mod wide_column;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::{FeedEntry, NewFeedEntry};
use crate::pagination::{CursorParams, OrderedSource};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use feed_repo::PgFeedStore;
pub use memory::MemoryFeedStore;
pub use wide_column::PgWideColumnBackend;

/// Durable feed-entry storage. The source of truth for every feed.
///
/// `(user_id, item_id)` is unique; writing an existing pair is a no-op.
/// Every listing is ordered by `created_at DESC, id DESC`.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Inserts one entry. `None` when the pair already existed.
    async fn insert(&self, entry: &NewFeedEntry) -> Result<Option<FeedEntry>>;

    /// Inserts many entries and returns only the rows actually created.
    async fn bulk_insert(&self, entries: &[NewFeedEntry]) -> Result<Vec<FeedEntry>>;

    async fn list(
        &self,
        user_id: i64,
        params: &CursorParams,
        limit: Option<usize>,
    ) -> Result<Vec<FeedEntry>>;

    /// Deletes every entry of an item and returns the affected recipients.
    async fn delete_for_item(&self, item_id: i64) -> Result<Vec<i64>>;
}

/// One recipient's feed as an ordered source.
pub struct UserFeed {
    store: Arc<dyn FeedStore>,
    user_id: i64,
}

impl UserFeed {
    pub fn new(store: Arc<dyn FeedStore>, user_id: i64) -> Self {
        Self { store, user_id }
    }
}

#[async_trait]
impl OrderedSource<FeedEntry> for UserFeed {
    async fn fetch(&self, params: &CursorParams, limit: Option<usize>) -> Result<Vec<FeedEntry>> {
        self.store.list(self.user_id, params, limit).await
    }
}

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    info!(
        max_connections = config.max_connections,
        "Database pool created"
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| crate::error::AppError::Database(e.into()))?;
    Ok(())
}
