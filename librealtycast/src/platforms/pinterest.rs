//! Pinterest API v5 adapter
//!
//! Pins land on the first board the account owns. A pin needs an image.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::http::{title_from, ApiClient};
use super::{ApiResult, PlatformAdapter};
use crate::error::ExternalApiError;
use crate::types::{OAuthToken, Platform, PublishPayload};

pub const DEFAULT_BASE_URL: &str = "https://api.pinterest.com";

const MAX_TITLE_CHARS: usize = 100;

pub struct PinterestAdapter {
    api: ApiClient,
}

impl PinterestAdapter {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self {
            api: ApiClient::new(Platform::Pinterest, client, base_url),
        }
    }

    async fn first_board(&self, token: &OAuthToken) -> ApiResult<String> {
        let boards = self
            .api
            .send(self.api.get("/v5/boards", token).query(&[("page_size", "1")]))
            .await?;
        self.api.field(&boards, "/items/0/id").map_err(|_| {
            ExternalApiError::new(Platform::Pinterest, "account has no boards to pin to")
        })
    }
}

#[async_trait]
impl PlatformAdapter for PinterestAdapter {
    fn platform(&self) -> Platform {
        Platform::Pinterest
    }

    async fn publish(&self, payload: &PublishPayload, token: &OAuthToken) -> ApiResult<String> {
        let image_url = self.api.require_media(payload)?;
        let board_id = self.first_board(token).await?;

        let pin = json!({
            "board_id": board_id,
            "title": title_from(&payload.content, MAX_TITLE_CHARS),
            "description": payload.content,
            "media_source": {
                "source_type": "image_url",
                "url": image_url,
            },
        });

        let created = self
            .api
            .send(self.api.post("/v5/pins", token).json(&pin))
            .await?;
        self.api.field(&created, "/id")
    }

    async fn probe(&self, token: &OAuthToken) -> ApiResult<()> {
        self.api
            .send(self.api.get("/v5/user_account", token))
            .await
            .map(|_| ())
    }
}
