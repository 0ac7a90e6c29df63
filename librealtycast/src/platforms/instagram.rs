//! Instagram Graph API adapter
//!
//! Publishing is two calls: create a media container, then publish it.
//! Instagram has no text-only posts, so a media URL is required.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::http::{is_video_url, ApiClient};
use super::{ApiResult, PlatformAdapter};
use crate::types::{OAuthToken, Platform, PublishPayload};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

pub struct InstagramAdapter {
    api: ApiClient,
}

impl InstagramAdapter {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self {
            api: ApiClient::new(Platform::Instagram, client, base_url),
        }
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(&self, payload: &PublishPayload, token: &OAuthToken) -> ApiResult<String> {
        let media = self.api.require_media(payload)?;

        let container = if is_video_url(media) {
            json!({ "media_type": "REELS", "video_url": media, "caption": payload.content })
        } else {
            json!({ "image_url": media, "caption": payload.content })
        };
        let created = self
            .api
            .send(self.api.post("/me/media", token).json(&container))
            .await?;
        let creation_id = self.api.field(&created, "/id")?;

        let published = self
            .api
            .send(
                self.api
                    .post("/me/media_publish", token)
                    .json(&json!({ "creation_id": creation_id })),
            )
            .await?;
        self.api.field(&published, "/id")
    }

    async fn probe(&self, token: &OAuthToken) -> ApiResult<()> {
        self.api.send(self.api.get("/me", token)).await.map(|_| ())
    }
}
