pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod fanout;
pub mod graph;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod pagination;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};

pub use cache::{BoundedCache, CacheSettings};
pub use fanout::{FanoutPipeline, FanoutQueue, FanoutReport};
pub use pagination::{Cursor, CursorParams, Paginator};
pub use services::{FeedService, TimelineService};
