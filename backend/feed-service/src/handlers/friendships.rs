use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use serde::Serialize;

use super::AppState;
use crate::error::{AppError, Result};
use crate::graph::FollowerProvider;
use crate::models::FollowRequest;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationList {
    pub user_id: i64,
    pub user_ids: Vec<i64>,
}

#[post("/friendships")]
pub async fn create_friendship(
    body: web::Json<FollowRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let request = body.into_inner();
    if request.from_user_id == request.to_user_id {
        return Err(AppError::Validation("users cannot follow themselves".to_string()));
    }

    state
        .graph
        .follow(request.from_user_id, request.to_user_id, Utc::now())
        .await?;

    Ok(HttpResponse::Created().json(request))
}

#[get("/users/{user_id}/followers")]
pub async fn list_followers(path: web::Path<i64>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let user_ids = state.graph.follower_ids(user_id).await?;
    Ok(HttpResponse::Ok().json(RelationList { user_id, user_ids }))
}

#[get("/users/{user_id}/followings")]
pub async fn list_followings(path: web::Path<i64>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let user_ids = state.graph.following_ids(user_id).await?;
    Ok(HttpResponse::Ok().json(RelationList { user_id, user_ids }))
}
