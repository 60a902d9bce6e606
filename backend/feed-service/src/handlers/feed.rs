/// Newsfeed and timeline HTTP handlers
use actix_web::{delete, get, post, web, HttpResponse};
use serde::Serialize;
use tracing::{debug, info};

use super::AppState;
use crate::error::Result;
use crate::models::FeedItem;
use crate::pagination::PageQuery;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractResponse {
    pub item_id: i64,
    pub recipients: usize,
}

#[get("/users/{user_id}/newsfeeds")]
pub async fn get_newsfeed(
    path: web::Path<i64>,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let params = query.into_inner().into_params()?;

    let page = state.feeds.get_page(user_id, &params).await?;
    debug!(
        user_id,
        items = page.items.len(),
        has_next_page = page.has_next_page,
        "Newsfeed page served"
    );

    Ok(HttpResponse::Ok().json(page))
}

#[get("/users/{user_id}/items")]
pub async fn get_user_items(
    path: web::Path<i64>,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let author_id = path.into_inner();
    let params = query.into_inner().into_params()?;

    let page = state.timelines.get_page(author_id, &params).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Publishes an item: records it, pushes it onto the author's timeline and
/// schedules feed fanout.
#[post("/newsfeeds/fanout")]
pub async fn distribute_item(
    body: web::Json<FeedItem>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let item = body.into_inner();

    state.items.record(item.clone()).await;
    state.timelines.record_published(&item).await?;
    let report = state.feeds.distribute(&item).await?;

    Ok(HttpResponse::Accepted().json(report))
}

#[delete("/items/{item_id}")]
pub async fn retract_item(path: web::Path<i64>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let item_id = path.into_inner();

    if let Some(item) = state.items.retract(item_id).await {
        state.timelines.record_removed(&item).await?;
    }
    let recipients = state.feeds.retract(item_id).await?;
    info!(item_id, recipients, "Retract request completed");

    Ok(HttpResponse::Ok().json(RetractResponse {
        item_id,
        recipients,
    }))
}

#[get("/fanout/stats")]
pub async fn fanout_stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.feeds.fanout_stats())
}
