//! LinkedIn UGC Posts adapter

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::http::ApiClient;
use super::{ApiResult, PlatformAdapter};
use crate::types::{OAuthToken, Platform, PublishPayload};

pub const DEFAULT_BASE_URL: &str = "https://api.linkedin.com";

/// Shares as the member the token belongs to
///
/// The author URN comes from the OpenID `userinfo` endpoint on every publish.
pub struct LinkedinAdapter {
    api: ApiClient,
}

impl LinkedinAdapter {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self {
            api: ApiClient::new(Platform::Linkedin, client, base_url),
        }
    }

    async fn author_urn(&self, token: &OAuthToken) -> ApiResult<String> {
        let me = self.api.send(self.api.get("/v2/userinfo", token)).await?;
        let sub = self.api.field(&me, "/sub")?;
        Ok(format!("urn:li:person:{}", sub))
    }
}

fn share_body(author: &str, payload: &PublishPayload) -> Value {
    let media: Vec<Value> = payload
        .media_urls
        .iter()
        .map(|url| json!({ "status": "READY", "originalUrl": url }))
        .collect();

    let mut share = json!({
        "shareCommentary": { "text": payload.content },
        "shareMediaCategory": if media.is_empty() { "NONE" } else { "ARTICLE" },
    });
    if !media.is_empty() {
        share["media"] = Value::Array(media);
    }

    json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": { "com.linkedin.ugc.ShareContent": share },
        "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
    })
}

#[async_trait]
impl PlatformAdapter for LinkedinAdapter {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    async fn publish(&self, payload: &PublishPayload, token: &OAuthToken) -> ApiResult<String> {
        let author = self.author_urn(token).await?;

        let response = self
            .api
            .send_raw(
                self.api
                    .post("/v2/ugcPosts", token)
                    .header("X-Restli-Protocol-Version", "2.0.0")
                    .json(&share_body(&author, payload)),
            )
            .await?;

        // The id may come back only as a header
        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: Value = response.json().await.unwrap_or(Value::Null);

        match self.api.field(&body, "/id") {
            Ok(id) => Ok(id),
            Err(err) => header_id.ok_or(err),
        }
    }

    async fn probe(&self, token: &OAuthToken) -> ApiResult<()> {
        self.author_urn(token).await.map(|_| ())
    }
}
