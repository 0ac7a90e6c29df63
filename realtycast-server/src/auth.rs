//! Caller identity extractors
//!
//! The site's authentication layer sits in front of this service and sets
//! `X-Admin-Id` for signed-in operators. The scheduler route additionally
//! accepts the shared cron secret as a bearer token.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

use crate::error::ApiError;
use crate::AppState;

pub const ADMIN_ID_HEADER: &str = "x-admin-id";

/// Owner key of the signed-in operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity(pub String);

fn admin_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ADMIN_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl FromRequestParts<Arc<AppState>> for AdminIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        admin_from_headers(&parts.headers)
            .map(AdminIdentity)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Who triggered a scheduler run: an operator or the external cron
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCaller {
    Cron,
    Admin(String),
}

impl SchedulerCaller {
    /// Identifies the caller in logs
    pub fn label(&self) -> String {
        match self {
            SchedulerCaller::Cron => "cron".to_string(),
            SchedulerCaller::Admin(id) => format!("admin:{}", id),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for SchedulerCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        if let (Some(presented), Some(secret)) = (bearer, state.cron_secret()) {
            if secrets_match(presented.trim(), secret) {
                return Ok(SchedulerCaller::Cron);
            }
            tracing::warn!("Scheduler trigger presented a wrong cron secret");
        }

        admin_from_headers(&parts.headers)
            .map(SchedulerCaller::Admin)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Compare without exiting at the first differing byte
fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
