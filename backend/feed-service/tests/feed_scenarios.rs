mod common;

use common::{background_queue, item, FlakyStore, HarnessBuilder, SlowFollowers, UnreachableLists};
use feed_service::cache::keys::newsfeed_key;
use feed_service::pagination::{Cursor, CursorParams};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_feed_past_cache_capacity_continues_from_durable_store() {
    let harness = HarnessBuilder::new().capacity(20).page_size(20).build().await;
    harness.follow(2, 1).await;

    for id in 1..=25 {
        harness.feeds.distribute(&item(id, 1, id)).await.unwrap();
    }

    let first = harness.feeds.get_page(2, &CursorParams::First).await.unwrap();
    assert_eq!(first.items.len(), 20);
    assert!(first.has_next_page);
    let ids: Vec<i64> = first.items.iter().map(|e| e.item_id).collect();
    assert_eq!(ids, (6..=25).rev().collect::<Vec<_>>());

    let last = first.items.last().unwrap();
    let rest = harness
        .feeds
        .get_page(2, &CursorParams::Before(Cursor::with_id(last.created_at, last.id)))
        .await
        .unwrap();
    let ids: Vec<i64> = rest.items.iter().map(|e| e.item_id).collect();
    assert_eq!(ids, vec![5, 4, 3, 2, 1]);
    assert!(!rest.has_next_page);

    assert_eq!(harness.lists.len(&newsfeed_key(2)).await, Some(20));
}

#[tokio::test]
async fn test_timestamp_cursor_continues_past_cache_capacity() {
    let harness = HarnessBuilder::new().capacity(20).page_size(20).build().await;
    harness.follow(2, 1).await;

    for id in 1..=25 {
        harness.feeds.distribute(&item(id, 1, id)).await.unwrap();
    }

    let first = harness.feeds.get_page(2, &CursorParams::First).await.unwrap();
    assert_eq!(first.items.len(), 20);
    assert!(first.has_next_page);

    let rest = harness
        .feeds
        .get_page(2, &CursorParams::Before(Cursor::at(first.items[19].created_at)))
        .await
        .unwrap();
    let ids: Vec<i64> = rest.items.iter().map(|e| e.item_id).collect();
    assert_eq!(ids, vec![5, 4, 3, 2, 1]);
    assert!(!rest.has_next_page);
}

#[tokio::test]
async fn test_flushed_cache_is_rebuilt_with_every_entry() {
    let harness = HarnessBuilder::new().build().await;
    harness.follow(2, 1).await;

    harness.feeds.distribute(&item(1, 1, 1)).await.unwrap();
    let before = harness.feeds.get_page(2, &CursorParams::First).await.unwrap();
    assert_eq!(before.items.len(), 1);

    harness.lists.clear().await;
    harness.feeds.distribute(&item(2, 1, 2)).await.unwrap();

    let after = harness.feeds.get_page(2, &CursorParams::First).await.unwrap();
    let ids: Vec<i64> = after.items.iter().map(|e| e.item_id).collect();
    assert_eq!(ids, vec![2, 1]);
}

#[tokio::test]
async fn test_author_without_followers_gets_only_own_entry() {
    let harness = HarnessBuilder::new().build().await;

    let report = harness.feeds.distribute(&item(1, 7, 1)).await.unwrap();
    assert_eq!(report.self_entry.as_ref().map(|e| e.user_id), Some(7));

    let page = harness.feeds.get_page(7, &CursorParams::First).await.unwrap();
    assert_eq!(page.items.len(), 1);
    let stats = harness.feeds.fanout_stats();
    assert_eq!(stats.plans_completed, 1);
    assert_eq!(stats.scheduled, 0);
}

#[tokio::test]
async fn test_followers_are_split_into_batches() {
    let harness = HarnessBuilder::new().batch_size(2).build().await;
    for follower in 10..15 {
        harness.follow(follower, 1).await;
    }
    // duplicate edge and a self-follow do not add recipients
    harness.follow(10, 1).await;
    harness.follow(1, 1).await;

    harness.feeds.distribute(&item(1, 1, 1)).await.unwrap();

    let stats = harness.feeds.fanout_stats();
    assert_eq!(stats.plans_completed, 1);
    assert_eq!(stats.scheduled, 3);
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.entries_written, 5);
    for follower in 10..15 {
        assert_eq!(harness.read_all(follower).await.len(), 1);
    }
}

#[tokio::test]
async fn test_redistributing_an_item_writes_nothing_new() {
    let harness = HarnessBuilder::new().build().await;
    harness.follow(2, 1).await;
    harness.follow(3, 1).await;

    let first = harness.feeds.distribute(&item(1, 1, 1)).await.unwrap();
    assert!(first.self_entry.is_some());
    let second = harness.feeds.distribute(&item(1, 1, 1)).await.unwrap();
    assert!(second.self_entry.is_none());

    assert_eq!(harness.feeds.fanout_stats().entries_written, 2);
    for user_id in [1, 2, 3] {
        let entries = harness.read_all(user_id).await;
        assert_eq!(entries.len(), 1, "user {} has duplicates", user_id);
    }
}

#[tokio::test]
async fn test_paging_visits_every_entry_exactly_once() {
    let harness = HarnessBuilder::new().capacity(7).page_size(3).build().await;
    harness.follow(2, 1).await;

    // pairs of items share a timestamp so the id tie-break matters
    for id in 1..=17 {
        harness.feeds.distribute(&item(id, 1, id / 2)).await.unwrap();
    }

    let entries = harness.read_all(2).await;
    let mut item_ids: Vec<i64> = entries.iter().map(|e| e.item_id).collect();
    assert_eq!(item_ids.len(), 17);
    for pair in entries.windows(2) {
        assert!((pair[0].created_at, pair[0].id) > (pair[1].created_at, pair[1].id));
    }
    item_ids.sort_unstable();
    item_ids.dedup();
    assert_eq!(item_ids.len(), 17);
}

#[tokio::test]
async fn test_refresh_returns_only_newer_entries() {
    let harness = HarnessBuilder::new().capacity(5).page_size(3).build().await;
    harness.follow(2, 1).await;
    for id in 1..=3 {
        harness.feeds.distribute(&item(id, 1, id)).await.unwrap();
    }

    let seen = harness.feeds.get_page(2, &CursorParams::First).await.unwrap();
    let head = seen.items.first().unwrap();
    let cursor = Cursor::with_id(head.created_at, head.id);

    let empty = harness.feeds.get_page(2, &CursorParams::After(cursor)).await.unwrap();
    assert!(empty.items.is_empty());

    for id in 4..=10 {
        harness.feeds.distribute(&item(id, 1, id)).await.unwrap();
    }

    // seven newer entries overflow the five cached ones
    let fresh = harness.feeds.get_page(2, &CursorParams::After(cursor)).await.unwrap();
    let ids: Vec<i64> = fresh.items.iter().map(|e| e.item_id).collect();
    assert_eq!(ids, (4..=10).rev().collect::<Vec<_>>());
    assert!(!fresh.has_next_page);
}

#[tokio::test]
async fn test_unreachable_cache_falls_back_to_durable_store() {
    let harness = HarnessBuilder::new()
        .list_backend(Arc::new(UnreachableLists))
        .page_size(2)
        .build()
        .await;
    harness.follow(2, 1).await;

    for id in 1..=3 {
        harness.feeds.distribute(&item(id, 1, id)).await.unwrap();
    }

    let page = harness.feeds.get_page(2, &CursorParams::First).await.unwrap();
    let ids: Vec<i64> = page.items.iter().map(|e| e.item_id).collect();
    assert_eq!(ids, vec![3, 2]);
    assert!(page.has_next_page);
    assert_eq!(harness.read_all(2).await.len(), 3);
}

#[tokio::test]
async fn test_retract_removes_item_from_every_feed() {
    let harness = HarnessBuilder::new().build().await;
    harness.follow(2, 1).await;
    harness.follow(3, 1).await;

    harness.feeds.distribute(&item(1, 1, 1)).await.unwrap();
    harness.feeds.distribute(&item(2, 1, 2)).await.unwrap();
    assert_eq!(harness.read_all(2).await.len(), 2);

    let recipients = harness.feeds.retract(2).await.unwrap();
    assert_eq!(recipients, 3);
    for user_id in [1, 2, 3] {
        let ids: Vec<i64> = harness.read_all(user_id).await.iter().map(|e| e.item_id).collect();
        assert_eq!(ids, vec![1]);
    }
}

#[tokio::test]
async fn test_retract_reports_unreachable_cache() {
    let harness = HarnessBuilder::new()
        .list_backend(Arc::new(UnreachableLists))
        .build()
        .await;
    harness.follow(2, 1).await;
    harness.feeds.distribute(&item(1, 1, 1)).await.unwrap();

    assert!(harness.feeds.retract(1).await.is_err());
}

#[tokio::test]
async fn test_background_fanout_retries_failed_batches() {
    let store = Arc::new(FlakyStore::failing(1));
    let harness = HarnessBuilder::new()
        .store(store.clone())
        .queue(background_queue(3))
        .build()
        .await;
    harness.follow(2, 1).await;
    harness.follow(3, 1).await;

    harness.feeds.distribute(&item(1, 1, 1)).await.unwrap();
    assert!(harness.feeds.fanout().queue().wait_idle(Duration::from_secs(5)).await);

    let stats = harness.feeds.fanout_stats();
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.count().await, 3);
    assert_eq!(harness.read_all(3).await.len(), 1);
}

#[tokio::test]
async fn test_background_fanout_gives_up_after_max_attempts() {
    let store = Arc::new(FlakyStore::failing(usize::MAX));
    let harness = HarnessBuilder::new()
        .store(store.clone())
        .queue(background_queue(2))
        .build()
        .await;
    harness.follow(2, 1).await;

    let report = harness.feeds.distribute(&item(1, 1, 1)).await.unwrap();
    assert!(report.self_entry.is_some());
    assert!(harness.feeds.fanout().queue().wait_idle(Duration::from_secs(5)).await);

    let stats = harness.feeds.fanout_stats();
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
    // only the author's own entry made it
    assert_eq!(store.count().await, 1);
}

#[tokio::test]
async fn test_distribute_returns_before_followers_are_enumerated() {
    let harness = HarnessBuilder::new()
        .followers(Arc::new(SlowFollowers {
            followers: vec![2, 3],
            delay: Duration::from_millis(300),
        }))
        .queue(background_queue(3))
        .build()
        .await;

    let started = std::time::Instant::now();
    let report = harness.feeds.distribute(&item(1, 1, 1)).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(report.self_entry.is_some());
    assert_eq!(harness.read_all(1).await.len(), 1);

    assert!(harness.feeds.fanout().queue().wait_idle(Duration::from_secs(5)).await);
    let stats = harness.feeds.fanout_stats();
    assert_eq!(stats.plans_completed, 1);
    assert_eq!(stats.delivered, 1);
    for user_id in [2, 3] {
        assert_eq!(harness.read_all(user_id).await.len(), 1);
    }
}
