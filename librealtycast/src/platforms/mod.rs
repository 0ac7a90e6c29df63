//! Platform adapters
//!
//! Every social network sits behind [`PlatformAdapter`]: a payload and a
//! token go in, the platform's id for the new post (or an
//! [`ExternalApiError`]) comes out. [`AdapterSet`] is the registry the
//! publisher dispatches through.
//!
//! # Examples
//!
//! ```no_run
//! use librealtycast::platforms::AdapterSet;
//! use librealtycast::types::{OAuthToken, Platform, PublishPayload};
//! use librealtycast::Config;
//!
//! # async fn example() -> librealtycast::error::Result<()> {
//! let adapters = AdapterSet::http(&Config::default_config())?;
//! let token = OAuthToken::new(Platform::Twitter, "admin-1", "access", None, i64::MAX);
//!
//! if let Some(twitter) = adapters.get(Platform::Twitter) {
//!     let id = twitter.publish(&PublishPayload::new("Open house Sunday"), &token).await?;
//!     println!("Posted: {}", id);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{ConfigError, ExternalApiError, Result};
use crate::tokens::LivenessProbe;
use crate::types::{OAuthToken, Platform, PublishPayload};

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod linkedin;
pub mod pinterest;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

// Available outside tests so integration tests can drive the scheduler
pub mod mock;

pub use facebook::FacebookAdapter;
pub use instagram::InstagramAdapter;
pub use linkedin::LinkedinAdapter;
pub use pinterest::PinterestAdapter;
pub use tiktok::TiktokAdapter;
pub use twitter::TwitterAdapter;
pub use youtube::YoutubeAdapter;

pub type ApiResult<T> = std::result::Result<T, ExternalApiError>;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One social network's publish and health-check calls
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Publish the payload and return the platform's id for it
    ///
    /// # Errors
    ///
    /// Any non-success response, network failure or missing required media
    /// becomes an `ExternalApiError` for this platform.
    async fn publish(&self, payload: &PublishPayload, token: &OAuthToken) -> ApiResult<String>;

    /// Cheap authenticated "who am I" call
    async fn probe(&self, token: &OAuthToken) -> ApiResult<()>;
}

/// Adapters keyed by platform
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: BTreeMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Real HTTP adapters for every platform, honouring `api_base` overrides
    pub fn http(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {}", e)))?;

        let mut set = Self::new();
        for platform in Platform::ALL {
            let base = config
                .platform(platform)
                .and_then(|p| p.api_base.clone());
            set.insert(http_adapter(
                platform,
                client.clone(),
                base,
                config.scheduling.max_media_bytes,
            ));
        }
        Ok(set)
    }

    /// Add or replace the adapter for its platform
    pub fn insert(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.insert(adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.adapters.keys().copied()
    }
}

fn http_adapter(
    platform: Platform,
    client: reqwest::Client,
    base: Option<String>,
    max_media_bytes: u64,
) -> Arc<dyn PlatformAdapter> {
    macro_rules! build {
        ($adapter:ty) => {
            match base {
                Some(base) => Arc::new(<$adapter>::with_base_url(client, base)),
                None => Arc::new(<$adapter>::new(client)),
            }
        };
    }

    match platform {
        Platform::Facebook => build!(FacebookAdapter),
        Platform::Instagram => build!(InstagramAdapter),
        Platform::Tiktok => build!(TiktokAdapter),
        Platform::Youtube => {
            let adapter = match base {
                Some(base) => YoutubeAdapter::with_base_url(client, base),
                None => YoutubeAdapter::new(client),
            };
            Arc::new(adapter.with_max_video_bytes(max_media_bytes))
        }
        Platform::Twitter => build!(TwitterAdapter),
        Platform::Linkedin => build!(LinkedinAdapter),
        Platform::Pinterest => build!(PinterestAdapter),
    }
}

#[async_trait]
impl LivenessProbe for AdapterSet {
    async fn probe(&self, platform: Platform, token: &OAuthToken) -> ApiResult<()> {
        match self.get(platform) {
            Some(adapter) => adapter.probe(token).await,
            None => Err(ExternalApiError::new(platform, "no adapter registered")),
        }
    }
}
