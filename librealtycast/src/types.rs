//! Core types for Realtycast

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Current time as a Unix timestamp (seconds)
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current time in Unix milliseconds, the rate limiter's clock
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Supported social networks
///
/// The order of the variants is the canonical order used when a post's
/// platform set is stored or displayed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    Tiktok,
    Youtube,
    #[serde(alias = "x")]
    Twitter,
    Linkedin,
    Pinterest,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Facebook,
        Platform::Instagram,
        Platform::Tiktok,
        Platform::Youtube,
        Platform::Twitter,
        Platform::Linkedin,
        Platform::Pinterest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Youtube => "youtube",
            Platform::Twitter => "twitter",
            Platform::Linkedin => "linkedin",
            Platform::Pinterest => "pinterest",
        }
    }

    /// Prefix for environment variables carrying this platform's OAuth client
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Platform::Facebook => "FACEBOOK",
            Platform::Instagram => "INSTAGRAM",
            Platform::Tiktok => "TIKTOK",
            Platform::Youtube => "YOUTUBE",
            Platform::Twitter => "TWITTER",
            Platform::Linkedin => "LINKEDIN",
            Platform::Pinterest => "PINTEREST",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::Tiktok),
            "youtube" => Ok(Platform::Youtube),
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::Linkedin),
            "pinterest" => Ok(Platform::Pinterest),
            _ => Err(format!(
                "Unsupported platform: '{}'. Valid options: facebook, instagram, tiktok, youtube, twitter, linkedin, pinterest",
                s
            )),
        }
    }
}

/// Lifecycle status of a social post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Partial,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Partial => "partial",
            PostStatus::Failed => "failed",
        }
    }

    /// Terminal status for a finished attempt
    ///
    /// Returns `None` while any target platform is still missing a result.
    pub fn from_results(
        platforms: &BTreeSet<Platform>,
        results: &BTreeMap<Platform, PublishResult>,
    ) -> Option<PostStatus> {
        if platforms.is_empty() || !platforms.iter().all(|p| results.contains_key(p)) {
            return None;
        }

        let successes = platforms
            .iter()
            .filter(|p| results.get(*p).is_some_and(PublishResult::is_success))
            .count();

        Some(if successes == platforms.len() {
            PostStatus::Published
        } else if successes == 0 {
            PostStatus::Failed
        } else {
            PostStatus::Partial
        })
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "partial" => Ok(PostStatus::Partial),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("unknown post status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Success,
    Failure,
}

/// Outcome of one publish attempt on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub platform: Platform,
    pub status: PublishStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempted_at: i64,
}

impl PublishResult {
    pub fn success(platform: Platform, external_id: String, attempted_at: i64) -> Self {
        Self {
            platform,
            status: PublishStatus::Success,
            external_id: Some(external_id),
            error: None,
            attempted_at,
        }
    }

    pub fn failure(platform: Platform, error: String, attempted_at: i64) -> Self {
        Self {
            platform,
            status: PublishStatus::Failure,
            external_id: None,
            error: Some(error),
            attempted_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PublishStatus::Success
    }
}

/// What an adapter needs to publish: the text and its media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishPayload {
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

impl PublishPayload {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            media_urls: Vec::new(),
        }
    }

    pub fn with_media(mut self, urls: Vec<String>) -> Self {
        self.media_urls = urls;
        self
    }

    pub fn first_media(&self) -> Option<&str> {
        self.media_urls.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub id: String,
    pub owner_key: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub scheduled_at: Option<i64>,
    pub platforms: BTreeSet<Platform>,
    pub status: PostStatus,
    pub results: BTreeMap<Platform, PublishResult>,
    pub attempts: u32,
    pub created_at: i64,
}

impl SocialPost {
    pub fn payload(&self) -> PublishPayload {
        PublishPayload {
            content: self.content.clone(),
            media_urls: self.media_urls.clone(),
        }
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.status == PostStatus::Scheduled && self.scheduled_at.is_some_and(|at| at <= now)
    }
}

/// Raw post-creation input, as received from a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// Stored OAuth credential for one `(platform, owner_key)` pair
pub struct OAuthToken {
    pub platform: Platform,
    pub owner_key: String,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Unix timestamp when the access token expires
    pub expires_at: i64,
}

impl OAuthToken {
    pub fn new(
        platform: Platform,
        owner_key: impl Into<String>,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: i64,
    ) -> Self {
        Self {
            platform,
            owner_key: owner_key.into(),
            access_token: SecretString::new(access_token.into()),
            refresh_token: refresh_token.map(|t| SecretString::new(t.into())),
            expires_at,
        }
    }

    /// True when the token expires within `margin_secs` of `now` (or already has)
    pub fn expires_within(&self, margin_secs: i64, now: i64) -> bool {
        self.expires_at - now <= margin_secs
    }
}

impl Clone for OAuthToken {
    fn clone(&self) -> Self {
        Self::new(
            self.platform,
            self.owner_key.clone(),
            self.access_token.expose_secret(),
            self.refresh_token.as_ref().map(|t| t.expose_secret()),
            self.expires_at,
        )
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("platform", &self.platform)
            .field("owner_key", &self.owner_key)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(platform: Platform, ok: bool) -> PublishResult {
        if ok {
            PublishResult::success(platform, "ext-1".to_string(), 0)
        } else {
            PublishResult::failure(platform, "boom".to_string(), 0)
        }
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("facebook".parse::<Platform>().unwrap(), Platform::Facebook);
        assert_eq!("TikTok".parse::<Platform>().unwrap(), Platform::Tiktok);
        assert_eq!("x".parse::<Platform>().unwrap(), Platform::Twitter);
        assert_eq!(" linkedin ".parse::<Platform>().unwrap(), Platform::Linkedin);

        let err = "myspace".parse::<Platform>().unwrap_err();
        assert!(err.contains("Unsupported platform: 'myspace'"));
    }

    #[test]
    fn test_platform_serde_roundtrip_uses_lowercase() {
        let json = serde_json::to_string(&Platform::Youtube).unwrap();
        assert_eq!(json, r#""youtube""#);

        let parsed: Platform = serde_json::from_str(r#""x""#).unwrap();
        assert_eq!(parsed, Platform::Twitter);
    }

    #[test]
    fn test_platform_display_matches_as_str() {
        for platform in Platform::ALL {
            assert_eq!(platform.to_string(), platform.as_str());
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn test_post_status_parse() {
        for status in [
            PostStatus::Draft,
            PostStatus::Scheduled,
            PostStatus::Publishing,
            PostStatus::Published,
            PostStatus::Partial,
            PostStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PostStatus>().unwrap(), status);
        }
        assert!("posted".parse::<PostStatus>().is_err());
    }

    #[test]
    fn test_from_results_all_success() {
        let platforms = BTreeSet::from([Platform::Facebook, Platform::Twitter]);
        let results = BTreeMap::from([
            (Platform::Facebook, result(Platform::Facebook, true)),
            (Platform::Twitter, result(Platform::Twitter, true)),
        ]);
        assert_eq!(
            PostStatus::from_results(&platforms, &results),
            Some(PostStatus::Published)
        );
    }

    #[test]
    fn test_from_results_mixed_is_partial() {
        let platforms = BTreeSet::from([Platform::Facebook, Platform::Twitter]);
        let results = BTreeMap::from([
            (Platform::Facebook, result(Platform::Facebook, true)),
            (Platform::Twitter, result(Platform::Twitter, false)),
        ]);
        assert_eq!(
            PostStatus::from_results(&platforms, &results),
            Some(PostStatus::Partial)
        );
    }

    #[test]
    fn test_from_results_all_failure() {
        let platforms = BTreeSet::from([Platform::Linkedin]);
        let results = BTreeMap::from([(Platform::Linkedin, result(Platform::Linkedin, false))]);
        assert_eq!(
            PostStatus::from_results(&platforms, &results),
            Some(PostStatus::Failed)
        );
    }

    #[test]
    fn test_from_results_incomplete() {
        let platforms = BTreeSet::from([Platform::Facebook, Platform::Twitter]);
        let results = BTreeMap::from([(Platform::Facebook, result(Platform::Facebook, true))]);
        assert_eq!(PostStatus::from_results(&platforms, &results), None);
    }

    #[test]
    fn test_publish_result_serialization() {
        let ok = PublishResult::success(Platform::Twitter, "123".to_string(), 42);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["platform"], "twitter");
        assert_eq!(json["status"], "success");
        assert_eq!(json["externalId"], "123");
        assert!(json.get("error").is_none());
        assert_eq!(json["attemptedAt"], 42);
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = OAuthToken::new(Platform::Facebook, "admin-1", "secret-access", Some("secret-refresh"), 100);
        let debug = format!("{:?}", token);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_token_expiry_margin() {
        let token = OAuthToken::new(Platform::Youtube, "admin-1", "a", None, 1_000);
        assert!(token.expires_within(300, 800));
        assert!(token.expires_within(300, 700));
        assert!(!token.expires_within(300, 699));
        assert!(token.expires_within(0, 1_000));
    }

    #[test]
    fn test_post_is_due() {
        let post = SocialPost {
            id: "p1".to_string(),
            owner_key: "admin".to_string(),
            content: "Hello".to_string(),
            media_urls: vec![],
            scheduled_at: Some(100),
            platforms: BTreeSet::from([Platform::Facebook]),
            status: PostStatus::Scheduled,
            results: BTreeMap::new(),
            attempts: 0,
            created_at: 0,
        };
        assert!(post.is_due(100));
        assert!(!post.is_due(99));

        let draft = SocialPost {
            status: PostStatus::Draft,
            ..post
        };
        assert!(!draft.is_due(1_000));
    }
}
