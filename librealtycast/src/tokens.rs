//! OAuth token storage with refresh-on-read

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;

use crate::error::{AuthError, ExternalApiError, RealtycastError, Result};
use crate::store::TokenRepository;
use crate::types::{OAuthToken, Platform};

/// Exchanges a refresh token for a fresh access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// `token.refresh_token` is guaranteed to be present
    async fn refresh(&self, token: &OAuthToken, now: i64) -> Result<OAuthToken>;
}

/// Cheap authenticated call proving a token still works
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(
        &self,
        platform: Platform,
        token: &OAuthToken,
    ) -> std::result::Result<(), ExternalApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub valid: bool,
}

impl ConnectionStatus {
    const DISCONNECTED: Self = Self {
        connected: false,
        valid: false,
    };
}

#[derive(Clone)]
pub struct TokenStore {
    repo: Arc<dyn TokenRepository>,
    refresher: Arc<dyn TokenRefresher>,
    probe: Arc<dyn LivenessProbe>,
    refresh_margin: Duration,
}

impl TokenStore {
    pub fn new(
        repo: Arc<dyn TokenRepository>,
        refresher: Arc<dyn TokenRefresher>,
        probe: Arc<dyn LivenessProbe>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            repo,
            refresher,
            probe,
            refresh_margin,
        }
    }

    /// Save a token, replacing any previous one for the same platform and owner
    pub async fn store_token(&self, token: &OAuthToken) -> Result<()> {
        self.repo.upsert_token(token).await?;
        tracing::info!(platform = %token.platform, owner = %token.owner_key, "Stored OAuth token");
        Ok(())
    }

    /// Return a token usable right now, refreshing it first if it is near expiry
    ///
    /// A failed refresh leaves the stored token untouched.
    pub async fn get_valid_token(
        &self,
        platform: Platform,
        owner_key: &str,
        now: i64,
    ) -> Result<OAuthToken> {
        let token = self
            .repo
            .get_token(platform, owner_key)
            .await?
            .ok_or(AuthError::NotConnected { platform })?;

        let margin = i64::try_from(self.refresh_margin.as_secs()).unwrap_or(i64::MAX);
        if !token.expires_within(margin, now) {
            return Ok(token);
        }

        if token.refresh_token.is_none() {
            return Err(AuthError::RefreshFailed {
                platform,
                reason: "no refresh token stored".to_string(),
            }
            .into());
        }

        tracing::debug!(platform = %platform, owner = %owner_key, expires_at = token.expires_at, "Refreshing OAuth token");
        let refreshed = match self.refresher.refresh(&token, now).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                tracing::warn!(platform = %platform, owner = %owner_key, error = %e, "Token refresh failed");
                return Err(AuthError::RefreshFailed {
                    platform,
                    reason: e.to_string(),
                }
                .into());
            }
        };

        self.repo.upsert_token(&refreshed).await?;
        Ok(refreshed)
    }

    /// Per-platform connection state for one owner
    ///
    /// `valid` is best effort: refresh and probe failures turn it false
    /// instead of failing the whole call.
    pub async fn connection_status(
        &self,
        owner_key: &str,
        now: i64,
    ) -> Result<BTreeMap<Platform, ConnectionStatus>> {
        let checks = Platform::ALL
            .into_iter()
            .map(|platform| self.check_platform(platform, owner_key, now));

        join_all(checks)
            .await
            .into_iter()
            .collect::<Result<BTreeMap<Platform, ConnectionStatus>>>()
    }

    async fn check_platform(
        &self,
        platform: Platform,
        owner_key: &str,
        now: i64,
    ) -> Result<(Platform, ConnectionStatus)> {
        if self.repo.get_token(platform, owner_key).await?.is_none() {
            return Ok((platform, ConnectionStatus::DISCONNECTED));
        }

        let valid = match self.get_valid_token(platform, owner_key, now).await {
            Ok(token) => match self.probe.probe(platform, &token).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(platform = %platform, error = %e, "Liveness probe failed");
                    false
                }
            },
            Err(RealtycastError::Auth(_)) => false,
            Err(e) => return Err(e),
        };

        Ok((
            platform,
            ConnectionStatus {
                connected: true,
                valid,
            },
        ))
    }

    /// Delete the stored token; returns whether one existed
    pub async fn disconnect(&self, platform: Platform, owner_key: &str) -> Result<bool> {
        let removed = self.repo.delete_token(platform, owner_key).await?;
        if removed {
            tracing::info!(platform = %platform, owner = %owner_key, "Disconnected platform");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use secrecy::ExposeSecret;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: i64 = 10_000;

    #[derive(Default)]
    struct FakeRefresher {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, token: &OAuthToken, now: i64) -> Result<OAuthToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExternalApiError::from_status(
                    token.platform,
                    400,
                    r#"{"error":"invalid_grant"}"#.to_string(),
                )
                .into());
            }
            Ok(OAuthToken::new(
                token.platform,
                token.owner_key.clone(),
                "fresh-access",
                Some("fresh-refresh"),
                now + 3_600,
            ))
        }
    }

    struct FakeProbe {
        healthy: Vec<Platform>,
    }

    #[async_trait]
    impl LivenessProbe for FakeProbe {
        async fn probe(
            &self,
            platform: Platform,
            _token: &OAuthToken,
        ) -> std::result::Result<(), ExternalApiError> {
            if self.healthy.contains(&platform) {
                Ok(())
            } else {
                Err(ExternalApiError::from_status(platform, 401, String::new()))
            }
        }
    }

    fn store_with(refresher: Arc<FakeRefresher>, healthy: Vec<Platform>) -> (TokenStore, Arc<MemoryStore>) {
        let repo = Arc::new(MemoryStore::new());
        let store = TokenStore::new(
            repo.clone(),
            refresher,
            Arc::new(FakeProbe { healthy }),
            Duration::from_secs(300),
        );
        (store, repo)
    }

    #[tokio::test]
    async fn test_missing_token_is_not_connected() {
        let (store, _) = store_with(Arc::default(), vec![]);
        let err = store
            .get_valid_token(Platform::Facebook, "admin-1", NOW)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RealtycastError::Auth(AuthError::NotConnected {
                platform: Platform::Facebook
            })
        ));
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_refresh() {
        let refresher = Arc::new(FakeRefresher::default());
        let (store, _) = store_with(refresher.clone(), vec![]);
        store
            .store_token(&OAuthToken::new(Platform::Twitter, "admin-1", "live", Some("r"), NOW + 301))
            .await
            .unwrap();

        let token = store.get_valid_token(Platform::Twitter, "admin-1", NOW).await.unwrap();
        assert_eq!(token.access_token.expose_secret(), "live");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_refreshed_and_persisted() {
        let refresher = Arc::new(FakeRefresher::default());
        let (store, repo) = store_with(refresher.clone(), vec![]);
        store
            .store_token(&OAuthToken::new(Platform::Youtube, "admin-1", "stale", Some("r"), NOW + 300))
            .await
            .unwrap();

        let token = store.get_valid_token(Platform::Youtube, "admin-1", NOW).await.unwrap();
        assert_eq!(token.access_token.expose_secret(), "fresh-access");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        let persisted = repo.get_token(Platform::Youtube, "admin-1").await.unwrap().unwrap();
        assert_eq!(persisted.access_token.expose_secret(), "fresh-access");
        assert_eq!(persisted.expires_at, NOW + 3_600);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_stale_token() {
        let refresher = Arc::new(FakeRefresher {
            fail: true,
            ..Default::default()
        });
        let (store, repo) = store_with(refresher, vec![]);
        store
            .store_token(&OAuthToken::new(Platform::Linkedin, "admin-1", "stale", Some("r"), NOW - 10))
            .await
            .unwrap();

        let err = store
            .get_valid_token(Platform::Linkedin, "admin-1", NOW)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RealtycastError::Auth(AuthError::RefreshFailed { .. })
        ));

        let persisted = repo.get_token(Platform::Linkedin, "admin-1").await.unwrap().unwrap();
        assert_eq!(persisted.access_token.expose_secret(), "stale");
    }

    #[tokio::test]
    async fn test_expiring_token_without_refresh_token() {
        let refresher = Arc::new(FakeRefresher::default());
        let (store, _) = store_with(refresher.clone(), vec![]);
        store
            .store_token(&OAuthToken::new(Platform::Facebook, "admin-1", "a", None, NOW))
            .await
            .unwrap();

        let err = store
            .get_valid_token(Platform::Facebook, "admin-1", NOW)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "refresh_failed");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_status_degrades_instead_of_failing() {
        let refresher = Arc::new(FakeRefresher {
            fail: true,
            ..Default::default()
        });
        let (store, _) = store_with(refresher, vec![Platform::Facebook]);
        let long_lived = NOW + 86_400;
        store
            .store_token(&OAuthToken::new(Platform::Facebook, "admin-1", "a", None, long_lived))
            .await
            .unwrap();
        store
            .store_token(&OAuthToken::new(Platform::Twitter, "admin-1", "a", None, long_lived))
            .await
            .unwrap();
        store
            .store_token(&OAuthToken::new(Platform::Youtube, "admin-1", "a", Some("r"), NOW - 1))
            .await
            .unwrap();

        let status = store.connection_status("admin-1", NOW).await.unwrap();
        assert_eq!(status.len(), Platform::ALL.len());
        assert_eq!(
            status[&Platform::Facebook],
            ConnectionStatus { connected: true, valid: true }
        );
        assert_eq!(
            status[&Platform::Twitter],
            ConnectionStatus { connected: true, valid: false }
        );
        assert_eq!(
            status[&Platform::Youtube],
            ConnectionStatus { connected: true, valid: false }
        );
        assert_eq!(status[&Platform::Pinterest], ConnectionStatus::DISCONNECTED);

        let other = store.connection_status("admin-2", NOW).await.unwrap();
        assert!(other.values().all(|s| !s.connected));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let (store, _) = store_with(Arc::default(), vec![]);
        store
            .store_token(&OAuthToken::new(Platform::Tiktok, "admin-1", "a", None, NOW + 1_000))
            .await
            .unwrap();

        assert!(store.disconnect(Platform::Tiktok, "admin-1").await.unwrap());
        assert!(!store.disconnect(Platform::Tiktok, "admin-1").await.unwrap());
        assert!(store
            .get_valid_token(Platform::Tiktok, "admin-1", NOW)
            .await
            .is_err());
    }
}
