//! Scheduler trigger (/scheduler/run)

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use librealtycast::service::RateLimitScope;
use librealtycast::types::{now_ms, now_ts};
use librealtycast::SchedulerRun;

use crate::auth::SchedulerCaller;
use crate::error::ApiResult;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/scheduler/run", post(run_scheduler))
}

/// POST /scheduler/run - One sweep over due posts
///
/// Answers 200 whenever the sweep ran, even if every publish failed. The
/// rate limit is one bucket for the process, whoever triggers it.
async fn run_scheduler(
    State(state): State<Arc<AppState>>,
    caller: SchedulerCaller,
) -> ApiResult<Json<SchedulerRun>> {
    let label = caller.label();
    state
        .service
        .check_rate_limit(RateLimitScope::Scheduler, &label, now_ms())?;

    tracing::info!(caller = %label, "Scheduler run triggered");
    let run = state.service.scheduler().run(now_ts()).await?;
    Ok(Json(run))
}
