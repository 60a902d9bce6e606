//! Whatever the interleaving of publishes, flushes and reads, a cached feed
//! is either absent or exactly the newest `capacity` durable entries.

mod common;

use common::{item, Harness, HarnessBuilder};
use feed_service::cache::backend::ListBackend;
use feed_service::cache::keys::newsfeed_key;
use feed_service::db::FeedStore;
use feed_service::models::FeedEntry;
use feed_service::pagination::CursorParams;
use proptest::prelude::*;

const CAPACITY: usize = 4;
const READER: i64 = 2;

#[derive(Debug, Clone)]
enum Op {
    Publish { secs: i64 },
    Flush,
    Read,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0i64..50).prop_map(|secs| Op::Publish { secs }),
        1 => Just(Op::Flush),
        2 => Just(Op::Read),
    ]
}

async fn cached(harness: &Harness) -> Option<Vec<FeedEntry>> {
    let values = harness.lists.read(&newsfeed_key(READER)).await.unwrap()?;
    Some(
        values
            .iter()
            .map(|value| serde_json::from_str(value).unwrap())
            .collect(),
    )
}

async fn durable_head(harness: &Harness) -> Vec<FeedEntry> {
    harness
        .store
        .list(READER, &CursorParams::First, Some(CAPACITY))
        .await
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cached_feed_is_always_a_durable_prefix(ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let harness = HarnessBuilder::new().capacity(CAPACITY).page_size(3).build().await;
            harness.follow(READER, 1).await;

            for (next_id, op) in (1i64..).zip(ops.iter()) {
                match op {
                    Op::Publish { secs } => {
                        harness.feeds.distribute(&item(next_id, 1, *secs)).await.unwrap();
                    }
                    Op::Flush => harness.lists.clear().await,
                    Op::Read => {
                        harness.feeds.get_page(READER, &CursorParams::First).await.unwrap();
                    }
                }

                if let Some(list) = cached(&harness).await {
                    assert_eq!(list, durable_head(&harness).await, "after {:?}", op);
                }
            }

            let all = harness.read_all(READER).await;
            let published = ops.iter().filter(|op| matches!(op, Op::Publish { .. })).count();
            assert_eq!(all.len(), published);
        });
    }
}
