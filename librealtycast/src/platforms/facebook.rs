//! Facebook Graph API adapter

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::http::{is_image_url, ApiClient};
use super::{ApiResult, PlatformAdapter};
use crate::types::{OAuthToken, Platform, PublishPayload};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

/// Posts to the feed of the account (or page) the token belongs to
///
/// An image as first media goes through `/me/photos` with the content as
/// caption; anything else becomes a feed post with the media as link.
pub struct FacebookAdapter {
    api: ApiClient,
}

impl FacebookAdapter {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self {
            api: ApiClient::new(Platform::Facebook, client, base_url),
        }
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(&self, payload: &PublishPayload, token: &OAuthToken) -> ApiResult<String> {
        let body = match payload.first_media() {
            Some(media) if is_image_url(media) => {
                let request = self.api.post("/me/photos", token).json(&json!({
                    "url": media,
                    "caption": payload.content,
                }));
                self.api.send(request).await?
            }
            media => {
                let mut body = json!({ "message": payload.content });
                if let Some(link) = media {
                    body["link"] = json!(link);
                }
                self.api
                    .send(self.api.post("/me/feed", token).json(&body))
                    .await?
            }
        };

        // Photo uploads report the feed story as post_id
        self.api
            .field(&body, "/post_id")
            .or_else(|_| self.api.field(&body, "/id"))
    }

    async fn probe(&self, token: &OAuthToken) -> ApiResult<()> {
        self.api.send(self.api.get("/me", token)).await.map(|_| ())
    }
}
