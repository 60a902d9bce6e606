use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

lazy_static! {
    /// Cache reads segmented by outcome (hit/miss/error/corrupt).
    pub static ref FEED_CACHE_EVENTS: IntCounterVec = register_int_counter_vec!(
        "feed_cache_events_total",
        "Feed cache events segmented by outcome",
        &["event"]
    )
    .expect("failed to register feed_cache_events_total");

    /// Cache writes segmented by operation (backfill/push/invalidate) and result.
    pub static ref FEED_CACHE_WRITE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "feed_cache_write_total",
        "Feed cache write attempts segmented by operation and outcome",
        &["op", "result"]
    )
    .expect("failed to register feed_cache_write_total");

    /// Where a served page came from (cache/durable).
    pub static ref FEED_PAGE_SOURCE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "feed_page_source_total",
        "Feed pages served segmented by data source",
        &["source"]
    )
    .expect("failed to register feed_page_source_total");

    /// Fanout batches by lifecycle step (scheduled/delivered/retried/failed).
    pub static ref FANOUT_BATCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fanout_batches_total",
        "Fanout batches segmented by result",
        &["result"]
    )
    .expect("failed to register fanout_batches_total");

    /// Fanout plan jobs by lifecycle step (scheduled/completed/retried/failed).
    pub static ref FANOUT_PLANS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fanout_plans_total",
        "Fanout follower enumeration jobs segmented by result",
        &["result"]
    )
    .expect("failed to register fanout_plans_total");

    /// Feed entries written by fanout batches.
    pub static ref FANOUT_ENTRIES_TOTAL: IntCounter = register_int_counter!(
        "fanout_entries_total",
        "Feed entries materialized by fanout"
    )
    .expect("failed to register fanout_entries_total");
}

pub fn record_cache_event(event: &str) {
    FEED_CACHE_EVENTS.with_label_values(&[event]).inc();
}

pub fn record_cache_write(op: &str, result: &str) {
    FEED_CACHE_WRITE_TOTAL.with_label_values(&[op, result]).inc();
}

pub fn record_page_source(source: &str) {
    FEED_PAGE_SOURCE_TOTAL.with_label_values(&[source]).inc();
}

pub fn record_fanout_batch(result: &str) {
    FANOUT_BATCHES_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_fanout_plan(result: &str) {
    FANOUT_PLANS_TOTAL.with_label_values(&[result]).inc();
}
