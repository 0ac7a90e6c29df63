//! OAuth 2.0 authorization-code flow for every supported platform
//!
//! The broker is stateless about the CSRF `state`: callers generate it with
//! [`OAuthBroker::generate_state`], keep it somewhere the browser cannot
//! forge (a cookie), and hand both copies back to
//! [`OAuthBroker::exchange_code`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::Config;
use crate::error::{AuthError, ConfigError, ExternalApiError, RealtycastError, Result};
use crate::tokens::TokenRefresher;
use crate::types::{OAuthToken, Platform};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const DAY: i64 = 24 * 60 * 60;

/// Endpoints and scopes for one provider
#[derive(Debug, Clone)]
struct Provider {
    auth_url: String,
    token_url: String,
    scope: &'static str,
}

impl Provider {
    fn defaults(platform: Platform) -> Self {
        let (auth_url, token_url, scope) = match platform {
            Platform::Facebook => (
                "https://www.facebook.com/v19.0/dialog/oauth",
                "https://graph.facebook.com/v19.0/oauth/access_token",
                "pages_manage_posts,pages_read_engagement,public_profile",
            ),
            Platform::Instagram => (
                "https://www.facebook.com/v19.0/dialog/oauth",
                "https://graph.facebook.com/v19.0/oauth/access_token",
                "instagram_basic,instagram_content_publish",
            ),
            Platform::Tiktok => (
                "https://www.tiktok.com/v2/auth/authorize/",
                "https://open.tiktokapis.com/v2/oauth/token/",
                "user.info.basic,video.publish",
            ),
            Platform::Youtube => (
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
                "https://www.googleapis.com/auth/youtube.upload https://www.googleapis.com/auth/youtube.readonly",
            ),
            Platform::Twitter => (
                "https://twitter.com/i/oauth2/authorize",
                "https://api.twitter.com/2/oauth2/token",
                "tweet.read tweet.write users.read offline.access",
            ),
            Platform::Linkedin => (
                "https://www.linkedin.com/oauth/v2/authorization",
                "https://www.linkedin.com/oauth/v2/accessToken",
                "openid profile w_member_social",
            ),
            Platform::Pinterest => (
                "https://www.pinterest.com/oauth/",
                "https://api.pinterest.com/v5/oauth/token",
                "boards:read,pins:write,user_accounts:read",
            ),
        };
        Self {
            auth_url: auth_url.to_string(),
            token_url: token_url.to_string(),
            scope,
        }
    }
}

/// Lifetime assumed when a token response carries no `expires_in`
pub fn default_token_lifetime(platform: Platform) -> i64 {
    match platform {
        Platform::Facebook | Platform::Instagram | Platform::Linkedin => 60 * DAY,
        Platform::Pinterest => 30 * DAY,
        Platform::Tiktok => DAY,
        Platform::Twitter => 2 * 60 * 60,
        Platform::Youtube => 60 * 60,
    }
}

/// Name of the client id parameter on the wire
fn client_id_param(platform: Platform) -> &'static str {
    match platform {
        Platform::Tiktok => "client_key",
        _ => "client_id",
    }
}

/// Providers that want client credentials in a Basic header instead of the form
fn uses_basic_auth(platform: Platform) -> bool {
    matches!(platform, Platform::Twitter | Platform::Pinterest)
}

/// PKCE S256 challenge for a verifier
pub fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

struct Client {
    id: String,
    secret: SecretString,
}

pub struct OAuthBroker {
    providers: BTreeMap<Platform, Provider>,
    clients: BTreeMap<Platform, Client>,
    redirect_uri: String,
    http: reqwest::Client,
}

impl OAuthBroker {
    /// Build from config; platforms without credentials fail only when used
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers = BTreeMap::new();
        let mut clients = BTreeMap::new();

        for platform in Platform::ALL {
            let mut provider = Provider::defaults(platform);
            if let Some(overrides) = config.platform(platform) {
                if let Some(url) = &overrides.auth_url {
                    provider.auth_url = url.clone();
                }
                if let Some(url) = &overrides.token_url {
                    provider.token_url = url.clone();
                }
            }
            providers.insert(platform, provider);

            if let Ok(creds) = config.client_credentials(platform) {
                clients.insert(
                    platform,
                    Client {
                        id: creds.client_id,
                        secret: creds.client_secret,
                    },
                );
            }
        }

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            providers,
            clients,
            redirect_uri: config.server.oauth_redirect_uri(),
            http,
        })
    }

    /// Random CSRF state: 32 bytes, base64url without padding
    pub fn generate_state() -> String {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn is_configured(&self, platform: Platform) -> bool {
        self.clients.contains_key(&platform)
    }

    fn client(&self, platform: Platform) -> Result<&Client> {
        self.clients
            .get(&platform)
            .ok_or_else(|| ConfigError::MissingCredentials(platform).into())
    }

    fn provider(&self, platform: Platform) -> Result<&Provider> {
        self.providers
            .get(&platform)
            .ok_or_else(|| ConfigError::Invalid(format!("no OAuth provider for {}", platform)).into())
    }

    /// Consent page URL for `platform`, carrying `state`
    pub fn auth_url(&self, platform: Platform, state: &str) -> Result<Url> {
        let client = self.client(platform)?;
        let provider = self.provider(platform)?;

        let mut url = Url::parse(&provider.auth_url).map_err(|e| {
            ConfigError::Invalid(format!("invalid auth_url for {}: {}", platform, e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair(client_id_param(platform), &client.id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", provider.scope)
                .append_pair("state", state);

            match platform {
                Platform::Twitter => {
                    query
                        .append_pair("code_challenge", &pkce_challenge(state))
                        .append_pair("code_challenge_method", "S256");
                }
                Platform::Youtube => {
                    query
                        .append_pair("access_type", "offline")
                        .append_pair("prompt", "consent");
                }
                _ => {}
            }
        }

        Ok(url)
    }

    /// Trade an authorization code for a token owned by `owner_key`
    ///
    /// The state check happens before any network traffic; an empty expected
    /// state never matches.
    pub async fn exchange_code(
        &self,
        platform: Platform,
        code: &str,
        expected_state: &str,
        received_state: &str,
        owner_key: &str,
        now: i64,
    ) -> Result<OAuthToken> {
        if expected_state.is_empty() || expected_state != received_state {
            tracing::warn!(platform = %platform, "OAuth callback state mismatch");
            return Err(AuthError::InvalidState.into());
        }

        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri.clone()),
        ];
        if platform == Platform::Twitter {
            form.push(("code_verifier", expected_state.to_string()));
        }

        let body = self.token_request(platform, form).await?;
        let token = parse_token_response(platform, owner_key, &body, None, now)?;
        tracing::info!(platform = %platform, owner = %owner_key, expires_at = token.expires_at, "OAuth code exchanged");
        Ok(token)
    }

    /// Refresh-token grant; keeps the old refresh token if none comes back
    pub async fn refresh(&self, token: &OAuthToken, now: i64) -> Result<OAuthToken> {
        let platform = token.platform;
        let refresh_token = token.refresh_token.as_ref().ok_or_else(|| AuthError::RefreshFailed {
            platform,
            reason: "no refresh token stored".to_string(),
        })?;

        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.expose_secret().to_string()),
        ];

        let body = self.token_request(platform, form).await?;
        parse_token_response(
            platform,
            &token.owner_key,
            &body,
            Some(refresh_token.expose_secret()),
            now,
        )
    }

    async fn token_request(
        &self,
        platform: Platform,
        mut form: Vec<(&'static str, String)>,
    ) -> Result<serde_json::Value> {
        let client = self.client(platform)?;
        let provider = self.provider(platform)?;

        let mut request = self.http.post(&provider.token_url);
        if uses_basic_auth(platform) {
            let credentials = format!("{}:{}", client.id, client.secret.expose_secret());
            request = request.header("Authorization", format!("Basic {}", STANDARD.encode(credentials)));
            if platform == Platform::Twitter {
                form.push(("client_id", client.id.clone()));
            }
        } else {
            form.push((client_id_param(platform), client.id.clone()));
            form.push(("client_secret", client.secret.expose_secret().to_string()));
        }

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| ExternalApiError::network(platform, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExternalApiError::network(platform, &e))?;

        if !status.is_success() {
            tracing::warn!(platform = %platform, status = status.as_u16(), "Token endpoint rejected request");
            return Err(ExternalApiError::from_status(platform, status.as_u16(), text).into());
        }

        serde_json::from_str(&text).map_err(|e| {
            RealtycastError::from(ExternalApiError {
                platform,
                status: Some(status.as_u16()),
                message: format!("token response is not JSON: {}", e),
                body: Some(text),
            })
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthBroker {
    async fn refresh(&self, token: &OAuthToken, now: i64) -> Result<OAuthToken> {
        OAuthBroker::refresh(self, token, now).await
    }
}

fn parse_token_response(
    platform: Platform,
    owner_key: &str,
    body: &serde_json::Value,
    previous_refresh: Option<&str>,
    now: i64,
) -> Result<OAuthToken> {
    let access_token = body["access_token"].as_str().ok_or_else(|| ExternalApiError {
        platform,
        status: None,
        message: "missing access_token in token response".to_string(),
        body: Some(body.to_string()),
    })?;

    let refresh_token = body["refresh_token"].as_str().or(previous_refresh);

    // Some providers send expires_in as a string
    let expires_in = body["expires_in"]
        .as_i64()
        .or_else(|| body["expires_in"].as_str().and_then(|s| s.parse().ok()))
        .filter(|secs| *secs > 0)
        .unwrap_or_else(|| default_token_lifetime(platform));

    Ok(OAuthToken::new(
        platform,
        owner_key,
        access_token,
        refresh_token,
        now + expires_in,
    ))
}
