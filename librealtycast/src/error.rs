//! Error types for Realtycast

use std::time::Duration;

use thiserror::Error;

use crate::types::Platform;

pub type Result<T> = std::result::Result<T, RealtycastError>;

#[derive(Error, Debug)]
pub enum RealtycastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("External API error: {0}")]
    ExternalApi(#[from] ExternalApiError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl RealtycastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RealtycastError::Validation(_) => 3,
            RealtycastError::Auth(_) => 2,
            RealtycastError::Config(_)
            | RealtycastError::Database(_)
            | RealtycastError::ExternalApi(_)
            | RealtycastError::RateLimited { .. }
            | RealtycastError::NotFound(_) => 1,
        }
    }

    /// Machine-readable reason, stable across releases
    pub fn reason(&self) -> &'static str {
        match self {
            RealtycastError::Config(_) => "configuration",
            RealtycastError::Database(_) => "internal",
            RealtycastError::Auth(auth) => auth.reason(),
            RealtycastError::ExternalApi(_) => "external_api",
            RealtycastError::Validation(_) => "validation",
            RealtycastError::RateLimited { .. } => "rate_limited",
            RealtycastError::NotFound(_) => "not_found",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("No OAuth client credentials configured for {0}")]
    MissingCredentials(Platform),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{platform} is not connected")]
    NotConnected { platform: Platform },

    #[error("Token refresh for {platform} failed: {reason}")]
    RefreshFailed { platform: Platform, reason: String },

    #[error("OAuth state mismatch")]
    InvalidState,
}

impl AuthError {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::NotConnected { .. } => "not_connected",
            AuthError::RefreshFailed { .. } => "refresh_failed",
            AuthError::InvalidState => "invalid_state",
        }
    }
}

/// A platform endpoint rejected or failed a call.
///
/// `body` keeps the raw response text for diagnostics; it is logged and
/// echoed to operators but never parsed further.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{platform} API error{}: {message}", status_suffix(.status))]
pub struct ExternalApiError {
    pub platform: Platform,
    pub status: Option<u16>,
    pub message: String,
    pub body: Option<String>,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl ExternalApiError {
    pub fn new(platform: Platform, message: impl Into<String>) -> Self {
        Self {
            platform,
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Build from a non-success HTTP response
    pub fn from_status(platform: Platform, status: u16, body: String) -> Self {
        let message = match status {
            401 | 403 => "request was not authorized".to_string(),
            429 => "platform rate limit exceeded".to_string(),
            s if s >= 500 => "platform is unavailable".to_string(),
            _ => "request was rejected".to_string(),
        };
        Self {
            platform,
            status: Some(status),
            message,
            body: Some(body),
        }
    }

    pub fn network(platform: Platform, error: &reqwest::Error) -> Self {
        Self {
            platform,
            status: error.status().map(|s| s.as_u16()),
            message: format!("network error: {}", error),
            body: None,
        }
    }

    pub fn timeout(platform: Platform, after: Duration) -> Self {
        Self::new(
            platform,
            format!("timed out after {}s", after.as_secs_f32()),
        )
    }

    /// Check if retrying later could succeed
    ///
    /// Network failures, timeouts, throttling and server errors are transient.
    /// Authorization and request-shape failures are not.
    pub fn is_transient(&self) -> bool {
        match self.status {
            Some(429) => true,
            Some(s) => s >= 500,
            None => self.message.starts_with("network error") || self.message.starts_with("timed out"),
        }
    }
}
