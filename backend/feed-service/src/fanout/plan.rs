use super::batch::FanoutBatch;
use crate::error::Result;
use crate::graph::FollowerProvider;
use crate::models::FeedItem;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Follower enumeration for one item, run as its own queue job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutPlan {
    pub item: FeedItem,
    /// Zero on first run
    pub attempt: u32,
}

impl FanoutPlan {
    pub fn new(item: FeedItem) -> Self {
        Self { item, attempt: 0 }
    }

    pub fn retry(&self) -> FanoutPlan {
        FanoutPlan {
            item: self.item.clone(),
            attempt: self.attempt + 1,
        }
    }
}

/// Turns a plan into delivery batches.
#[derive(Clone)]
pub struct Planner {
    graph: Arc<dyn FollowerProvider>,
    batch_size: usize,
}

impl Planner {
    pub fn new(graph: Arc<dyn FollowerProvider>, batch_size: usize) -> Self {
        Self {
            graph,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn plan(&self, plan: &FanoutPlan) -> Result<Vec<FanoutBatch>> {
        let item = &plan.item;
        let followers = recipients(self.graph.follower_ids(item.author_id).await?, item.author_id);
        let batches = FanoutBatch::split(item, &followers, self.batch_size);

        info!(
            item_id = item.id,
            author_id = item.author_id,
            "{} newsfeeds going to fanout, {} batches created.",
            followers.len(),
            batches.len()
        );
        Ok(batches)
    }
}

/// Unique follower ids without the author, in provider order.
fn recipients(follower_ids: Vec<i64>, author_id: i64) -> Vec<i64> {
    let mut seen = HashSet::new();
    follower_ids
        .into_iter()
        .filter(|id| *id != author_id && seen.insert(*id))
        .collect()
}
