pub mod feed;
pub mod friendships;

use crate::graph::WideColumnGraph;
use crate::services::{FeedService, MemoryItemProvider, TimelineService};
use actix_web::web;
use std::sync::Arc;

pub use feed::{distribute_item, fanout_stats, get_newsfeed, get_user_items, retract_item};
pub use friendships::{create_friendship, list_followers, list_followings};

/// Shared state for every route.
pub struct AppState {
    pub feeds: Arc<FeedService>,
    pub timelines: Arc<TimelineService>,
    pub items: Arc<MemoryItemProvider>,
    pub graph: Arc<WideColumnGraph>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(get_newsfeed)
            .service(get_user_items)
            .service(list_followers)
            .service(list_followings)
            .service(distribute_item)
            .service(retract_item)
            .service(fanout_stats)
            .service(create_friendship),
    );
}
