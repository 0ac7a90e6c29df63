//! TikTok Content Posting API adapter
//!
//! TikTok fetches the video itself (`PULL_FROM_URL`), so the media URL must
//! be on a domain verified for the app. The call returns a `publish_id`
//! immediately; processing finishes asynchronously on TikTok's side.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::http::{title_from, ApiClient};
use super::{ApiResult, PlatformAdapter};
use crate::error::ExternalApiError;
use crate::types::{OAuthToken, Platform, PublishPayload};

pub const DEFAULT_BASE_URL: &str = "https://open.tiktokapis.com";

const MAX_TITLE_CHARS: usize = 150;

pub struct TiktokAdapter {
    api: ApiClient,
}

impl TiktokAdapter {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self {
            api: ApiClient::new(Platform::Tiktok, client, base_url),
        }
    }

    /// TikTok reports some failures inside a 200 response
    fn check_envelope(&self, body: &Value) -> ApiResult<()> {
        match body.pointer("/error/code").and_then(Value::as_str) {
            None | Some("ok") => Ok(()),
            Some(code) => Err(ExternalApiError {
                platform: Platform::Tiktok,
                status: None,
                message: format!("request failed with code {}", code),
                body: Some(body.to_string()),
            }),
        }
    }
}

#[async_trait]
impl PlatformAdapter for TiktokAdapter {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    async fn publish(&self, payload: &PublishPayload, token: &OAuthToken) -> ApiResult<String> {
        let video_url = self.api.require_media(payload)?;

        let request = json!({
            "post_info": {
                "title": title_from(&payload.content, MAX_TITLE_CHARS),
                "privacy_level": "PUBLIC_TO_EVERYONE",
            },
            "source_info": {
                "source": "PULL_FROM_URL",
                "video_url": video_url,
            },
        });

        let body = self
            .api
            .send(
                self.api
                    .post("/v2/post/publish/video/init/", token)
                    .json(&request),
            )
            .await?;
        self.check_envelope(&body)?;
        self.api.field(&body, "/data/publish_id")
    }

    async fn probe(&self, token: &OAuthToken) -> ApiResult<()> {
        let body = self
            .api
            .send(
                self.api
                    .get("/v2/user/info/", token)
                    .query(&[("fields", "open_id,display_name")]),
            )
            .await?;
        self.check_envelope(&body)
    }
}
