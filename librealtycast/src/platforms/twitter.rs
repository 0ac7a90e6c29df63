//! X (Twitter) API v2 adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::ApiClient;
use super::{ApiResult, PlatformAdapter};
use crate::types::{OAuthToken, Platform, PublishPayload};

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// Posts a tweet; media URLs are appended to the text as links
pub struct TwitterAdapter {
    api: ApiClient,
}

#[derive(Serialize)]
struct CreateTweetRequest {
    text: String,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

impl TwitterAdapter {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self {
            api: ApiClient::new(Platform::Twitter, client, base_url),
        }
    }
}

fn tweet_text(payload: &PublishPayload) -> String {
    if payload.media_urls.is_empty() {
        return payload.content.clone();
    }
    format!("{}\n{}", payload.content, payload.media_urls.join("\n"))
}

#[async_trait]
impl PlatformAdapter for TwitterAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn publish(&self, payload: &PublishPayload, token: &OAuthToken) -> ApiResult<String> {
        let request = CreateTweetRequest {
            text: tweet_text(payload),
        };
        let body = self
            .api
            .send(self.api.post("/2/tweets", token).json(&request))
            .await?;

        match serde_json::from_value::<CreateTweetResponse>(body.clone()) {
            Ok(created) => Ok(created.data.id),
            Err(_) => self.api.field(&body, "/data/id"),
        }
    }

    async fn probe(&self, token: &OAuthToken) -> ApiResult<()> {
        self.api
            .send(self.api.get("/2/users/me", token))
            .await
            .map(|_| ())
    }
}
