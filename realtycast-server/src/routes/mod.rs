pub mod connections;
pub mod oauth;
pub mod posts;
pub mod scheduler;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes mounted under `/api/social`
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(connections::routes())
        .merge(oauth::routes())
        .merge(posts::routes())
        .merge(scheduler::routes())
}
