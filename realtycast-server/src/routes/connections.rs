//! Platform connection endpoints (/status, /connections/{platform})

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use librealtycast::tokens::ConnectionStatus;
use librealtycast::types::now_ts;
use librealtycast::{Platform, RealtycastError};

use crate::auth::AdminIdentity;
use crate::error::ApiResult;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(status))
        .route("/connections/{platform}", delete(disconnect))
}

/// GET /status - `{ connected, valid }` for every platform
async fn status(
    State(state): State<Arc<AppState>>,
    AdminIdentity(admin): AdminIdentity,
) -> ApiResult<Json<BTreeMap<Platform, ConnectionStatus>>> {
    Ok(Json(state.service.connection_status(&admin, now_ts()).await?))
}

/// DELETE /connections/{platform} - Forget the stored token
async fn disconnect(
    State(state): State<Arc<AppState>>,
    AdminIdentity(admin): AdminIdentity,
    Path(platform): Path<String>,
) -> ApiResult<StatusCode> {
    let platform: Platform = platform.parse().map_err(RealtycastError::Validation)?;

    if state.service.tokens().disconnect(platform, &admin).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RealtycastError::NotFound(format!("no {} connection", platform)).into())
    }
}
