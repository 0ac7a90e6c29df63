//! Configuration management for Realtycast

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::rate_limiter::RateLimitRule;
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default, deserialize_with = "deserialize_platforms")]
    pub platforms: BTreeMap<Platform, PlatformConfig>,
}

/// Table keys are platform names; unknown names are rejected
fn deserialize_platforms<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<Platform, PlatformConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, PlatformConfig>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(name, entry)| {
            name.parse::<Platform>()
                .map(|platform| (platform, entry))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally visible base URL, used to build OAuth redirect URIs
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Where the OAuth callback sends the operator after a successful connect
    #[serde(default = "default_operator_ui_url")]
    pub operator_ui_url: String,
    /// Shared secret an external cron may present instead of an admin session
    #[serde(default)]
    pub cron_secret: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_operator_ui_url() -> String {
    "http://localhost:3000/admin/social".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: default_public_url(),
            operator_ui_url: default_operator_ui_url(),
            cron_secret: None,
        }
    }
}

impl ServerConfig {
    /// Redirect URI registered with every platform's OAuth app
    pub fn oauth_redirect_uri(&self) -> String {
        format!(
            "{}/api/social/oauth/callback",
            self.public_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn rule(&self) -> RateLimitRule {
        RateLimitRule::new(self.limit, Duration::from_secs(self.window_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default = "default_scheduler_limit")]
    pub scheduler: RateLimitConfig,
    #[serde(default = "default_publish_limit")]
    pub publish: RateLimitConfig,
    #[serde(default = "default_posts_limit")]
    pub posts: RateLimitConfig,
}

fn default_scheduler_limit() -> RateLimitConfig {
    RateLimitConfig {
        limit: 6,
        window_secs: 60,
    }
}

fn default_publish_limit() -> RateLimitConfig {
    RateLimitConfig {
        limit: 10,
        window_secs: 60,
    }
}

fn default_posts_limit() -> RateLimitConfig {
    RateLimitConfig {
        limit: 30,
        window_secs: 60,
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            scheduler: default_scheduler_limit(),
            publish: default_publish_limit(),
            posts: default_posts_limit(),
        }
    }
}

/// What happens to a post whose every platform failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum FailurePolicy {
    /// The post stays `failed`
    #[default]
    Terminal,
    /// The post goes back to `scheduled` after `delay_secs`, up to `max_attempts` sweeps
    Requeue { max_attempts: u32, delay_secs: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    #[serde(default = "default_refresh_margin")]
    pub token_refresh_margin_secs: u64,
    #[serde(default = "default_max_concurrent_posts")]
    pub max_concurrent_posts: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Largest media file an adapter will download before uploading it
    #[serde(default = "default_max_media_bytes")]
    pub max_media_bytes: u64,
}

fn default_publish_timeout() -> u64 {
    30
}

fn default_refresh_margin() -> u64 {
    300
}

fn default_max_concurrent_posts() -> usize {
    4
}

fn default_max_media_bytes() -> u64 {
    256 * 1024 * 1024
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            publish_timeout_secs: default_publish_timeout(),
            token_refresh_margin_secs: default_refresh_margin(),
            max_concurrent_posts: default_max_concurrent_posts(),
            failure_policy: FailurePolicy::default(),
            max_media_bytes: default_max_media_bytes(),
        }
    }
}

impl SchedulingConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }
}

/// OAuth client and endpoint overrides for one platform
///
/// Endpoint fields are normally left unset; they exist so that staging
/// environments and tests can point a platform at a different host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Client credentials resolved for a platform
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error: the defaults are used and environment
    /// variables still apply.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(path = %config_path.display(), "config file not found, using defaults");
            Self::default_config()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                backend: StorageBackend::Sqlite,
                path: "~/.local/share/realtycast/social.db".to_string(),
            },
            server: ServerConfig::default(),
            rate_limits: RateLimitsConfig::default(),
            scheduling: SchedulingConfig::default(),
            platforms: BTreeMap::new(),
        }
    }

    /// Fold `<PLATFORM>_CLIENT_ID` / `<PLATFORM>_CLIENT_SECRET` and friends into the config
    ///
    /// Environment values win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for platform in Platform::ALL {
            let prefix = platform.env_prefix();
            let id = lookup(&format!("{}_CLIENT_ID", prefix));
            let secret = lookup(&format!("{}_CLIENT_SECRET", prefix));
            if id.is_none() && secret.is_none() {
                continue;
            }
            let entry = self.platforms.entry(platform).or_default();
            if id.is_some() {
                entry.client_id = id;
            }
            if secret.is_some() {
                entry.client_secret = secret;
            }
        }

        if let Some(path) = lookup("REALTYCAST_DB_PATH") {
            self.database.path = path;
        }
        if let Some(secret) = lookup("REALTYCAST_CRON_SECRET") {
            self.server.cron_secret = Some(secret);
        }
    }

    pub fn platform(&self, platform: Platform) -> Option<&PlatformConfig> {
        self.platforms.get(&platform)
    }

    /// Client id and secret for a platform, or `MissingCredentials`
    pub fn client_credentials(&self, platform: Platform) -> Result<ClientCredentials> {
        let entry = self
            .platforms
            .get(&platform)
            .ok_or(ConfigError::MissingCredentials(platform))?;

        match (&entry.client_id, &entry.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Ok(ClientCredentials {
                    client_id: id.clone(),
                    client_secret: SecretString::new(secret.as_str().into()),
                })
            }
            _ => Err(ConfigError::MissingCredentials(platform).into()),
        }
    }

    /// Expanded database path
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database.path).to_string())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("REALTYCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("realtycast").join("config.toml"))
}
