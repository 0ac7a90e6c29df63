//! YouTube Data API adapter
//!
//! Uses a resumable upload session: the video is downloaded from the media
//! URL, a session is opened with the snippet, and the bytes are sent to the
//! session URL in one `PUT`.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::json;

use super::http::{title_from, ApiClient};
use super::{ApiResult, PlatformAdapter};
use crate::error::ExternalApiError;
use crate::types::{OAuthToken, Platform, PublishPayload};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

const MAX_TITLE_CHARS: usize = 100;

pub const DEFAULT_MAX_VIDEO_BYTES: u64 = 256 * 1024 * 1024;

pub struct YoutubeAdapter {
    api: ApiClient,
    max_video_bytes: u64,
}

struct Video {
    bytes: Vec<u8>,
    content_type: String,
}

impl YoutubeAdapter {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        Self {
            api: ApiClient::new(Platform::Youtube, client, base_url),
            max_video_bytes: DEFAULT_MAX_VIDEO_BYTES,
        }
    }

    pub fn with_max_video_bytes(mut self, max_video_bytes: u64) -> Self {
        self.max_video_bytes = max_video_bytes;
        self
    }

    fn too_large(&self, media_url: &str) -> ExternalApiError {
        ExternalApiError::new(
            Platform::Youtube,
            format!("media {} is larger than {} bytes", media_url, self.max_video_bytes),
        )
    }

    /// Fetch the video, refusing anything over `max_video_bytes`
    async fn download(&self, media_url: &str) -> ApiResult<Video> {
        let mut response = self
            .api
            .http()
            .get(media_url)
            .send()
            .await
            .map_err(|e| ExternalApiError::network(Platform::Youtube, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalApiError::new(
                Platform::Youtube,
                format!("could not fetch media {} (HTTP {})", media_url, status.as_u16()),
            ));
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_video_bytes)
        {
            return Err(self.too_large(media_url));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("video/*")
            .to_string();

        // Content-Length may be absent or wrong
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ExternalApiError::network(Platform::Youtube, &e))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_video_bytes {
                return Err(self.too_large(media_url));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(Video {
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl PlatformAdapter for YoutubeAdapter {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn publish(&self, payload: &PublishPayload, token: &OAuthToken) -> ApiResult<String> {
        let media_url = self.api.require_media(payload)?;
        let video = self.download(media_url).await?;

        let metadata = json!({
            "snippet": {
                "title": title_from(&payload.content, MAX_TITLE_CHARS),
                "description": payload.content,
            },
            "status": { "privacyStatus": "public" },
        });

        let session = self
            .api
            .send_raw(
                self.api
                    .post("/upload/youtube/v3/videos", token)
                    .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
                    .header("X-Upload-Content-Type", video.content_type.as_str())
                    .header("X-Upload-Content-Length", video.bytes.len().to_string())
                    .json(&metadata),
            )
            .await?;

        let upload_url = session
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ExternalApiError::new(Platform::Youtube, "upload session has no Location header")
            })?;

        let uploaded = self
            .api
            .send(
                self.api
                    .http()
                    .put(&upload_url)
                    .bearer_auth(token.access_token.expose_secret())
                    .header(CONTENT_TYPE, video.content_type)
                    .body(video.bytes),
            )
            .await?;
        self.api.field(&uploaded, "/id")
    }

    async fn probe(&self, token: &OAuthToken) -> ApiResult<()> {
        self.api
            .send(
                self.api
                    .get("/youtube/v3/channels", token)
                    .query(&[("part", "id"), ("mine", "true")]),
            )
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> OAuthToken {
        OAuthToken::new(Platform::Youtube, "admin-1", "yt", Some("r"), i64::MAX)
    }

    #[tokio::test]
    async fn test_resumable_upload_flow() {
        let server = MockServer::start().await;
        let video = b"fake-mp4-bytes".to_vec();

        Mock::given(method("GET"))
            .and(path("/media/tour.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp4")
                    .set_body_bytes(video.clone()),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .and(query_param("uploadType", "resumable"))
            .and(header("x-upload-content-type", "video/mp4"))
            .and(header("x-upload-content-length", "14"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("location", format!("{}/upload/session/abc", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/upload/session/abc"))
            .and(header("authorization", "Bearer yt"))
            .and(body_bytes(video))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "dQw4w9WgXcQ" })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = YoutubeAdapter::with_base_url(Client::new(), server.uri());
        let payload = PublishPayload::new("Home tour: 3 bed 2 bath\nDetails inside")
            .with_media(vec![format!("{}/media/tour.mp4", server.uri())]);
        assert_eq!(adapter.publish(&payload, &token()).await.unwrap(), "dQw4w9WgXcQ");
    }

    #[tokio::test]
    async fn test_unreachable_media_fails_before_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/missing.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = YoutubeAdapter::with_base_url(Client::new(), server.uri());
        let payload = PublishPayload::new("x")
            .with_media(vec![format!("{}/media/missing.mp4", server.uri())]);
        let err = adapter.publish(&payload, &token()).await.unwrap_err();
        assert!(err.message.contains("could not fetch media"));
    }

    #[tokio::test]
    async fn test_oversized_media_fails_before_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/huge.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter =
            YoutubeAdapter::with_base_url(Client::new(), server.uri()).with_max_video_bytes(1024);
        let payload = PublishPayload::new("x")
            .with_media(vec![format!("{}/media/huge.mp4", server.uri())]);
        let err = adapter.publish(&payload, &token()).await.unwrap_err();
        assert!(err.message.contains("larger than 1024 bytes"));
    }

    #[tokio::test]
    async fn test_session_without_location_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/a.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"v".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let adapter = YoutubeAdapter::with_base_url(Client::new(), server.uri());
        let payload = PublishPayload::new("x").with_media(vec![format!("{}/media/a.mp4", server.uri())]);
        let err = adapter.publish(&payload, &token()).await.unwrap_err();
        assert!(err.message.contains("Location"));
    }

    #[tokio::test]
    async fn test_probe_lists_own_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/channels"))
            .and(query_param("mine", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [{ "id": "UC1" }] })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = YoutubeAdapter::with_base_url(Client::new(), server.uri());
        adapter.probe(&token()).await.unwrap();
    }
}
