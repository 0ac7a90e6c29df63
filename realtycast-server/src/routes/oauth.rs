//! OAuth connect flow (/oauth/start, /oauth/callback)
//!
//! The CSRF state travels in an HttpOnly cookie between the two requests;
//! the broker itself keeps nothing.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::CookieJar;
use librealtycast::error::AuthError;
use librealtycast::oauth::OAuthBroker;
use librealtycast::types::now_ts;
use librealtycast::{Platform, RealtycastError};
use serde::Deserialize;

use crate::auth::AdminIdentity;
use crate::cookies;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/oauth/start", get(start))
        .route("/oauth/callback", get(callback))
}

#[derive(Deserialize)]
struct StartParams {
    platform: String,
}

#[derive(Deserialize)]
struct CallbackParams {
    platform: String,
    code: Option<String>,
    state: Option<String>,
    /// Set by the provider when the operator declined consent
    error: Option<String>,
}

fn parse_platform(name: &str) -> ApiResult<Platform> {
    name.parse()
        .map_err(|e: String| ApiError::from(RealtycastError::Validation(e)))
}

fn see_other(location: &str) -> ApiResult<Response> {
    let location = HeaderValue::from_str(location).map_err(|_| {
        RealtycastError::Validation(format!("redirect target is not a valid header: {}", location))
    })?;
    let mut response = StatusCode::SEE_OTHER.into_response();
    response.headers_mut().insert(LOCATION, location);
    Ok(response)
}

/// GET /oauth/start?platform= - Redirect to the platform's consent page
async fn start(
    State(state): State<Arc<AppState>>,
    AdminIdentity(admin): AdminIdentity,
    params: Result<Query<StartParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let platform = parse_platform(&params.platform)?;

    let csrf = OAuthBroker::generate_state();
    let url = state.service.oauth().auth_url(platform, &csrf)?;

    let cookie = cookies::build_state_cookie(&csrf, state.secure_cookies()).ok_or_else(|| {
        RealtycastError::Validation("generated state is not a valid cookie value".to_string())
    })?;

    tracing::info!(platform = %platform, owner = %admin, "Starting OAuth connect");
    let mut response = see_other(url.as_str())?;
    response.headers_mut().append(SET_COOKIE, cookie);
    Ok(response)
}

/// GET /oauth/callback - Verify state, exchange the code, store the token
///
/// The state cookie is single-use: it is cleared on every answer, including
/// errors.
async fn callback(
    State(state): State<Arc<AppState>>,
    AdminIdentity(admin): AdminIdentity,
    jar: CookieJar,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let mut response = match complete_connect(&state, &admin, &jar, params).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_clear_state_cookie());
    response
}

async fn complete_connect(
    state: &AppState,
    admin: &str,
    jar: &CookieJar,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let platform = parse_platform(&params.platform)?;

    if let Some(denied) = params.error {
        return Err(RealtycastError::Validation(format!(
            "{} authorization was not granted: {}",
            platform, denied
        ))
        .into());
    }

    let expected = jar
        .get(cookies::OAUTH_STATE_NAME)
        .map(|c| c.value().to_string())
        .unwrap_or_default();
    let received = params.state.unwrap_or_default();
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        let error = if !expected.is_empty() && expected == received {
            RealtycastError::Validation("missing authorization code".to_string())
        } else {
            AuthError::InvalidState.into()
        };
        return Err(error.into());
    };

    let service = &state.service;
    let token = service
        .oauth()
        .exchange_code(platform, &code, &expected, &received, admin, now_ts())
        .await?;
    service.tokens().store_token(&token).await?;

    tracing::info!(platform = %platform, owner = %admin, "Platform connected");

    let operator_ui = service.config().server.operator_ui_url.as_str();
    let separator = if operator_ui.contains('?') { '&' } else { '?' };
    see_other(&format!("{}{}connected={}", operator_ui, separator, platform))
}
