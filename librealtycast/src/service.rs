//! Service facade wiring storage, tokens, adapters and the scheduler together
//!
//! `RealtycastService` is the single entry point for the HTTP server and the
//! CLI. All components share the same stores, so a post created through one
//! handle is visible to the scheduler of another clone.
//!
//! # Example
//!
//! ```no_run
//! use librealtycast::service::RealtycastService;
//! use librealtycast::types::now_ts;
//!
//! # async fn example() -> librealtycast::Result<()> {
//! let service = RealtycastService::new().await?;
//! let run = service.scheduler().run(now_ts()).await?;
//! println!("{} posts processed", run.published.len());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{RealtycastError, Result};
use crate::oauth::OAuthBroker;
use crate::platforms::AdapterSet;
use crate::posts::{validate_payload, PostRepository};
use crate::publisher::Publisher;
use crate::rate_limiter::{RateLimitDecision, RateLimiter};
use crate::scheduler::Scheduler;
use crate::store::Stores;
use crate::tokens::{ConnectionStatus, TokenStore};
use crate::types::{Platform, PublishResult};

/// Body of an immediate multi-platform publish
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// Which configured rate-limit rule a request counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Scheduler,
    Publish,
    Posts,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Scheduler => "scheduler",
            RateLimitScope::Publish => "publish",
            RateLimitScope::Posts => "posts",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct RealtycastService {
    config: Arc<Config>,
    posts: PostRepository,
    tokens: TokenStore,
    publisher: Publisher,
    scheduler: Scheduler,
    oauth: Arc<OAuthBroker>,
    limiter: Arc<RateLimiter>,
}

impl RealtycastService {
    /// Load configuration from the default location and open its storage
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Open the configured backend and build real HTTP adapters
    pub async fn from_config(config: Config) -> Result<Self> {
        let stores = Stores::from_config(&config).await?;
        let adapters = AdapterSet::http(&config)?;
        Self::with_parts(config, stores, adapters)
    }

    /// Assemble from explicit stores and adapters
    ///
    /// Tests use this to swap in `MemoryStore` and mock adapters.
    pub fn with_parts(config: Config, stores: Stores, adapters: AdapterSet) -> Result<Self> {
        let oauth = Arc::new(OAuthBroker::from_config(&config)?);
        let tokens = TokenStore::new(
            stores.tokens,
            oauth.clone(),
            Arc::new(adapters.clone()),
            config.scheduling.token_refresh_margin(),
        );
        let posts = PostRepository::new(stores.posts);
        let publisher = Publisher::new(adapters, tokens.clone(), config.scheduling.publish_timeout());
        let scheduler = Scheduler::new(posts.clone(), publisher.clone(), &config.scheduling);

        Ok(Self {
            config: Arc::new(config),
            posts,
            tokens,
            publisher,
            scheduler,
            oauth,
            limiter: Arc::new(RateLimiter::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn posts(&self) -> &PostRepository {
        &self.posts
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn oauth(&self) -> &OAuthBroker {
        &self.oauth
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Count one request from `caller` against `scope`
    ///
    /// `posts` and `publish` are counted per caller. The scheduler has a
    /// single bucket for the whole process, shared by cron and every
    /// operator. A denied request becomes `RateLimited` carrying the seconds
    /// until the window resets.
    pub fn check_rate_limit(
        &self,
        scope: RateLimitScope,
        caller: &str,
        now_ms: i64,
    ) -> Result<RateLimitDecision> {
        let rule = match scope {
            RateLimitScope::Scheduler => self.config.rate_limits.scheduler.rule(),
            RateLimitScope::Publish => self.config.rate_limits.publish.rule(),
            RateLimitScope::Posts => self.config.rate_limits.posts.rule(),
        };
        let key = match scope {
            RateLimitScope::Scheduler => scope.to_string(),
            RateLimitScope::Publish | RateLimitScope::Posts => format!("{}:{}", scope, caller),
        };
        let decision = self.limiter.allow(&key, rule, now_ms);

        if decision.allowed {
            debug!(scope = %scope, caller = %caller, remaining = decision.remaining, "Rate limit ok");
            Ok(decision)
        } else {
            let retry_after_secs = decision.retry_after_secs(now_ms);
            warn!(scope = %scope, caller = %caller, retry_after_secs, "Rate limit exceeded");
            Err(RealtycastError::RateLimited { retry_after_secs })
        }
    }

    /// Publish right away without creating a post record
    pub async fn publish_now(&self, request: PublishRequest, owner_key: &str) -> Result<Vec<PublishResult>> {
        let (payload, platforms) =
            validate_payload(&request.content, &request.media_urls, &request.platforms)?;
        Ok(self.publisher.publish_to_all(&platforms, &payload, owner_key).await)
    }

    pub async fn connection_status(
        &self,
        owner_key: &str,
        now: i64,
    ) -> Result<BTreeMap<Platform, ConnectionStatus>> {
        self.tokens.connection_status(owner_key, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use crate::platforms::mock::MockAdapter;
    use crate::types::{now_ts, OAuthToken, PublishStatus};

    fn memory_config() -> Config {
        let mut config = Config::default_config();
        config.database.backend = StorageBackend::Memory;
        config.rate_limits.posts.limit = 2;
        config
    }

    fn service(adapters: AdapterSet) -> RealtycastService {
        RealtycastService::with_parts(memory_config(), Stores::memory(), adapters).unwrap()
    }

    #[test]
    fn test_rate_limit_scopes_are_independent() {
        let service = service(AdapterSet::new());
        let now = 1_000_000;

        assert!(service.check_rate_limit(RateLimitScope::Posts, "admin-1", now).is_ok());
        assert!(service.check_rate_limit(RateLimitScope::Posts, "admin-1", now).is_ok());
        match service.check_rate_limit(RateLimitScope::Posts, "admin-1", now + 1_000) {
            Err(RealtycastError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 59),
            other => panic!("expected RateLimited, got {:?}", other.map(|d| d.remaining)),
        }

        // Other callers and other scopes have their own buckets
        assert!(service.check_rate_limit(RateLimitScope::Posts, "admin-2", now).is_ok());
        assert!(service.check_rate_limit(RateLimitScope::Publish, "admin-1", now).is_ok());
    }

    #[test]
    fn test_scheduler_limit_is_shared_by_all_callers() {
        let service = service(AdapterSet::new());
        let limit = service.config().rate_limits.scheduler.limit;
        let now = 1_000_000;

        for i in 0..limit {
            let caller = format!("admin:{}", i);
            assert!(service.check_rate_limit(RateLimitScope::Scheduler, &caller, now).is_ok());
        }
        for caller in ["cron", "admin:fresh"] {
            assert!(matches!(
                service.check_rate_limit(RateLimitScope::Scheduler, caller, now),
                Err(RealtycastError::RateLimited { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_publish_now_validates_then_publishes() {
        let fb = Arc::new(MockAdapter::success(Platform::Facebook));
        let service = service(AdapterSet::new().with(fb.clone()));
        service
            .tokens()
            .store_token(&OAuthToken::new(Platform::Facebook, "admin-1", "t", None, now_ts() + 86_400))
            .await
            .unwrap();

        let err = service
            .publish_now(
                PublishRequest {
                    content: "  ".to_string(),
                    platforms: vec!["facebook".to_string()],
                    ..Default::default()
                },
                "admin-1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RealtycastError::Validation(_)));
        assert_eq!(fb.publish_call_count(), 0);

        let results = service
            .publish_now(
                PublishRequest {
                    content: "Just listed".to_string(),
                    platforms: vec!["facebook".to_string(), "twitter".to_string()],
                    ..Default::default()
                },
                "admin-1",
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, PublishStatus::Success);
        assert_eq!(results[1].status, PublishStatus::Failure);
    }

    #[tokio::test]
    async fn test_connection_status_covers_every_platform() {
        let service = service(AdapterSet::new());
        let status = service.connection_status("admin-1", now_ts()).await.unwrap();
        assert_eq!(status.len(), Platform::ALL.len());
        assert!(status.values().all(|s| !s.connected && !s.valid));
    }
}
