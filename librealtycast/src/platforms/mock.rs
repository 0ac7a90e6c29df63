//! Mock adapter for testing
//!
//! Simulates successes, failures and slow platforms without network access
//! and records every call so tests can assert on what was (or was not)
//! published.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::{ApiResult, PlatformAdapter};
use crate::error::ExternalApiError;
use crate::types::{OAuthToken, Platform, PublishPayload};

/// Configuration for mock adapter behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Whether publishing should succeed
    pub publish_succeeds: bool,

    /// Error to return on publish failure
    pub publish_error: Option<String>,

    /// HTTP status attached to the failure, if any
    pub error_status: Option<u16>,

    /// Whether the liveness probe should succeed
    pub probe_succeeds: bool,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Number of times publish has been called
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Number of times probe has been called
    pub probe_call_count: Arc<Mutex<usize>>,

    /// Payloads that were published (for verification)
    pub published: Arc<Mutex<Vec<PublishPayload>>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            publish_succeeds: true,
            publish_error: None,
            error_status: None,
            probe_succeeds: true,
            delay: Duration::ZERO,
            publish_call_count: Arc::new(Mutex::new(0)),
            probe_call_count: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockAdapter {
    config: MockConfig,
}

fn bump(counter: &Mutex<usize>) {
    *counter.lock().unwrap_or_else(PoisonError::into_inner) += 1;
}

impl MockAdapter {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock adapter that always succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// Create a mock adapter whose publish fails with `error`
    pub fn failure(platform: Platform, error: &str) -> Self {
        Self::new(MockConfig {
            publish_succeeds: false,
            publish_error: Some(error.to_string()),
            ..MockConfig::new(platform)
        })
    }

    /// Create a mock adapter that answers with an HTTP error status
    pub fn http_failure(platform: Platform, status: u16) -> Self {
        Self::new(MockConfig {
            publish_succeeds: false,
            error_status: Some(status),
            probe_succeeds: false,
            ..MockConfig::new(platform)
        })
    }

    /// Create a mock adapter with a delay
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    pub fn publish_call_count(&self) -> usize {
        *self
            .config
            .publish_call_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn probe_call_count(&self) -> usize {
        *self
            .config
            .probe_call_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// All payloads that were published successfully
    pub fn published(&self) -> Vec<PublishPayload> {
        self.config
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn error(&self) -> ExternalApiError {
        match self.config.error_status {
            Some(status) => ExternalApiError::from_status(
                self.config.platform,
                status,
                self.config.publish_error.clone().unwrap_or_default(),
            ),
            None => ExternalApiError::new(
                self.config.platform,
                self.config
                    .publish_error
                    .clone()
                    .unwrap_or_else(|| "Mock publish failed".to_string()),
            ),
        }
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn publish(&self, payload: &PublishPayload, _token: &OAuthToken) -> ApiResult<String> {
        bump(&self.config.publish_call_count);

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if !self.config.publish_succeeds {
            return Err(self.error());
        }

        self.config
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.clone());
        Ok(format!("{}:mock-{}", self.config.platform, uuid::Uuid::new_v4()))
    }

    async fn probe(&self, _token: &OAuthToken) -> ApiResult<()> {
        bump(&self.config.probe_call_count);
        if self.config.probe_succeeds {
            Ok(())
        } else {
            Err(self.error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> OAuthToken {
        OAuthToken::new(Platform::Facebook, "admin-1", "t", None, i64::MAX)
    }

    #[tokio::test]
    async fn test_mock_success() {
        let adapter = MockAdapter::success(Platform::Facebook);

        let id = adapter
            .publish(&PublishPayload::new("Test content"), &token())
            .await
            .unwrap();
        assert!(id.starts_with("facebook:mock-"));
        assert_eq!(adapter.publish_call_count(), 1);

        let published = adapter.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].content, "Test content");
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let adapter = MockAdapter::failure(Platform::Twitter, "Duplicate content");

        let err = adapter
            .publish(&PublishPayload::new("Test"), &token())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate content"));
        assert_eq!(adapter.publish_call_count(), 1);
        assert!(adapter.published().is_empty());
    }

    #[tokio::test]
    async fn test_mock_http_failure() {
        let adapter = MockAdapter::http_failure(Platform::Youtube, 503);

        let err = adapter
            .publish(&PublishPayload::new("Test"), &token())
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(503));
        assert!(adapter.probe(&token()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let adapter = MockAdapter::with_delay(Platform::Tiktok, Duration::from_millis(50));

        let start = std::time::Instant::now();
        adapter
            .publish(&PublishPayload::new("Test"), &token())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
