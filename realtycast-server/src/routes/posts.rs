//! Post endpoints (/posts, /publish)

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use librealtycast::service::{PublishRequest, RateLimitScope};
use librealtycast::types::{now_ms, now_ts};
use librealtycast::{NewPost, PublishResult, SocialPost};

use crate::auth::AdminIdentity;
use crate::error::ApiResult;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/publish", post(publish_now))
}

/// POST /posts - Create a draft, or a scheduled post when `scheduledAt` is given
async fn create_post(
    State(state): State<Arc<AppState>>,
    AdminIdentity(admin): AdminIdentity,
    body: Result<Json<NewPost>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SocialPost>)> {
    state
        .service
        .check_rate_limit(RateLimitScope::Posts, &admin, now_ms())?;
    let Json(input) = body?;

    let post = state.service.posts().create_post(input, &admin, now_ts()).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /posts - Scheduled posts by time, then drafts newest first
async fn list_posts(
    State(state): State<Arc<AppState>>,
    AdminIdentity(_admin): AdminIdentity,
) -> ApiResult<Json<Vec<SocialPost>>> {
    Ok(Json(state.service.posts().list_posts().await?))
}

/// POST /publish - Publish immediately to every listed platform
///
/// Per-platform failures are part of the 200 response body.
async fn publish_now(
    State(state): State<Arc<AppState>>,
    AdminIdentity(admin): AdminIdentity,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<PublishResult>>> {
    state
        .service
        .check_rate_limit(RateLimitScope::Publish, &admin, now_ms())?;
    let Json(request) = body?;

    Ok(Json(state.service.publish_now(request, &admin).await?))
}
