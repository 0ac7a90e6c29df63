//! Mapping of engine errors onto HTTP responses

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use librealtycast::error::AuthError;
use librealtycast::RealtycastError;
use serde::Serialize;

/// Everything a handler can fail with
#[derive(Debug)]
pub enum ApiError {
    /// No admin identity and no valid cron secret
    Unauthorized,
    Core(RealtycastError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    reason: &'static str,
}

impl From<RealtycastError> for ApiError {
    fn from(error: RealtycastError) -> Self {
        ApiError::Core(error)
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        ApiError::Core(error.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Core(RealtycastError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Core(RealtycastError::Validation(rejection.body_text()))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn status_for(error: &RealtycastError) -> StatusCode {
    match error {
        RealtycastError::Validation(_) => StatusCode::BAD_REQUEST,
        RealtycastError::Auth(AuthError::InvalidState) => StatusCode::BAD_REQUEST,
        RealtycastError::Auth(_) => StatusCode::UNAUTHORIZED,
        RealtycastError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        RealtycastError::ExternalApi(_) => StatusCode::BAD_GATEWAY,
        RealtycastError::NotFound(_) => StatusCode::NOT_FOUND,
        RealtycastError::Config(_) | RealtycastError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match self {
            ApiError::Unauthorized => {
                let body = ErrorBody {
                    error: "missing admin identity".to_string(),
                    reason: "unauthorized",
                };
                return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
            }
            ApiError::Core(error) => error,
        };

        let status = status_for(&error);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %error, reason = error.reason(), "Request failed");
            "internal server error".to_string()
        } else {
            if let RealtycastError::ExternalApi(api) = &error {
                tracing::warn!(platform = %api.platform, status = ?api.status, body = ?api.body, "Platform call failed");
            }
            error.to_string()
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: message,
                reason: error.reason(),
            }),
        )
            .into_response();

        if let RealtycastError::RateLimited { retry_after_secs } = error {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                headers.insert(header::RETRY_AFTER, value);
            }
            headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use librealtycast::error::{ConfigError, ExternalApiError};
    use librealtycast::Platform;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RealtycastError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AuthError::InvalidState.into(), StatusCode::BAD_REQUEST),
            (
                AuthError::NotConnected {
                    platform: Platform::Tiktok,
                }
                .into(),
                StatusCode::UNAUTHORIZED,
            ),
            (
                RealtycastError::RateLimited { retry_after_secs: 3 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ExternalApiError::from_status(Platform::Facebook, 500, String::new()).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (RealtycastError::NotFound("p".into()), StatusCode::NOT_FOUND),
            (
                ConfigError::MissingCredentials(Platform::Youtube).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(status_for(&error), expected, "{}", error);
        }
    }

    #[test]
    fn test_rate_limited_headers() {
        let response = ApiError::from(RealtycastError::RateLimited { retry_after_secs: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    }
}
