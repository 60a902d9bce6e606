use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One item materialized into one recipient's feed.
///
/// `created_at` is the item's creation time, not the materialization time;
/// entries are ordered by `(created_at, id)` descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A feed entry before the durable store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedEntry {
    pub user_id: i64,
    pub item_id: i64,
    pub created_at: DateTime<Utc>,
}

impl NewFeedEntry {
    pub fn for_recipient(item: &FeedItem, user_id: i64) -> Self {
        Self {
            user_id,
            item_id: item.id,
            created_at: item.created_at,
        }
    }
}

/// Published content as seen by the feed engine: only identity, author and
/// creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: i64,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
}

impl<T> FeedPage<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_next_page: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub from_user_id: i64,
    pub to_user_id: i64,
}
