//! Request plumbing shared by the HTTP adapters

use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde_json::Value;

use super::ApiResult;
use crate::error::ExternalApiError;
use crate::types::{OAuthToken, Platform, PublishPayload};

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "m4v", "webm", "avi"];
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// HTTP client bound to one platform's API base
#[derive(Debug, Clone)]
pub struct ApiClient {
    platform: Platform,
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(platform: Platform, client: Client, base_url: impl Into<String>) -> Self {
        Self {
            platform,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str, token: &OAuthToken) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .bearer_auth(token.access_token.expose_secret())
    }

    pub fn post(&self, path: &str, token: &OAuthToken) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .bearer_auth(token.access_token.expose_secret())
    }

    /// Send and return the raw response once its status is a success
    pub async fn send_raw(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ExternalApiError::network(self.platform, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalApiError::from_status(
                self.platform,
                status.as_u16(),
                body,
            ));
        }
        Ok(response)
    }

    /// Send and parse the JSON body; an empty body yields `Value::Null`
    pub async fn send(&self, request: RequestBuilder) -> ApiResult<Value> {
        let response = self.send_raw(request).await?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ExternalApiError::network(self.platform, &e))?;

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ExternalApiError {
            platform: self.platform,
            status: Some(status),
            message: format!("response is not JSON: {}", e),
            body: Some(text),
        })
    }

    /// String (or numeric) field at a JSON pointer such as `/data/id`
    pub fn field(&self, body: &Value, pointer: &str) -> ApiResult<String> {
        match body.pointer(pointer) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(ExternalApiError {
                platform: self.platform,
                status: None,
                message: format!("response is missing {}", pointer),
                body: Some(body.to_string()),
            }),
        }
    }

    /// First media URL, or an error for platforms that cannot post text alone
    pub fn require_media<'a>(&self, payload: &'a PublishPayload) -> ApiResult<&'a str> {
        payload
            .first_media()
            .ok_or_else(|| ExternalApiError::new(self.platform, "a media URL is required"))
    }
}

fn extension(url: &str) -> Option<String> {
    let path = url::Url::parse(url).ok()?.path().to_string();
    let (_, ext) = path.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

pub fn is_video_url(url: &str) -> bool {
    extension(url).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_image_url(url: &str) -> bool {
    extension(url).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// First line of the content, cut to `max` characters, for title fields
pub fn title_from(content: &str, max: usize) -> String {
    content
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(max)
        .collect()
}
