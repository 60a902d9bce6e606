pub mod feed_service;
pub mod timeline;

pub use feed_service::FeedService;
pub use timeline::{ItemProvider, MemoryItemProvider, TimelineService};

use crate::cache::{BoundedCache, CachedRow};
use crate::error::Result;
use crate::metrics::feed::record_page_source;
use crate::models::FeedPage;
use crate::pagination::{CursorParams, OrderedSource, Paginator};
use tracing::debug;

/// Resolves one page for a cached owner key: from the cached prefix when it
/// can answer, otherwise straight from the durable source.
pub(crate) async fn cached_page<T: CachedRow>(
    cache: &BoundedCache<T>,
    key: &str,
    source: &dyn OrderedSource<T>,
    paginator: &Paginator,
    params: &CursorParams,
) -> Result<FeedPage<T>> {
    let cached = cache.load_or_backfill(key, source).await?;

    if let Some(page) = paginator.paginate_cached_list(&cached, params, cache.capacity()) {
        record_page_source("cache");
        return Ok(page);
    }

    debug!(key = %key, cached = cached.len(), "Page runs past cached prefix");
    record_page_source("durable");
    paginator.paginate_source(source, params).await
}
