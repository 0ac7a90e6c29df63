//! Post creation, listing and lifecycle transitions

use std::collections::BTreeSet;
use std::sync::Arc;

use url::Url;

use crate::error::{RealtycastError, Result};
use crate::scheduling::parse_schedule_ts;
use crate::store::PostStore;
use crate::types::{NewPost, Platform, PostStatus, PublishPayload, PublishResult, SocialPost};

/// Maximum content size in bytes (100KB)
const MAX_CONTENT_LENGTH: usize = 100 * 1024;

/// Check content, media and platform names shared by scheduled and immediate posts
///
/// Platform names are parsed case-insensitively and duplicates collapse.
pub fn validate_payload(
    content: &str,
    media_urls: &[String],
    platforms: &[String],
) -> Result<(PublishPayload, BTreeSet<Platform>)> {
    let content = content.trim();
    if content.is_empty() {
        return Err(RealtycastError::Validation(
            "Content cannot be empty".to_string(),
        ));
    }
    if content.len() > MAX_CONTENT_LENGTH {
        return Err(RealtycastError::Validation(format!(
            "Content too large: {} bytes (maximum: {} bytes)",
            content.len(),
            MAX_CONTENT_LENGTH
        )));
    }

    if platforms.is_empty() {
        return Err(RealtycastError::Validation(
            "At least one platform is required".to_string(),
        ));
    }
    let platforms = platforms
        .iter()
        .map(|name| name.parse::<Platform>().map_err(RealtycastError::Validation))
        .collect::<Result<BTreeSet<Platform>>>()?;

    for media in media_urls {
        let url = Url::parse(media)
            .map_err(|e| RealtycastError::Validation(format!("Invalid media URL '{}': {}", media, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RealtycastError::Validation(format!(
                "Media URL must use http or https: {}",
                media
            )));
        }
    }

    Ok((
        PublishPayload::new(content).with_media(media_urls.to_vec()),
        platforms,
    ))
}

/// Post records and their status transitions, over any [`PostStore`]
#[derive(Clone)]
pub struct PostRepository {
    store: Arc<dyn PostStore>,
}

impl PostRepository {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self { store }
    }

    /// Validate and persist a new post
    ///
    /// With a `scheduledAt` the post is `scheduled` at that time, even if the
    /// time has already passed (it is then due on the next run). Without
    /// one it is a `draft`.
    pub async fn create_post(&self, input: NewPost, owner_key: &str, now: i64) -> Result<SocialPost> {
        let (payload, platforms) =
            validate_payload(&input.content, &input.media_urls, &input.platforms)?;

        let scheduled_at = input
            .scheduled_at
            .as_deref()
            .map(|raw| parse_schedule_ts(raw, now))
            .transpose()?;

        let post = SocialPost {
            id: uuid::Uuid::new_v4().to_string(),
            owner_key: owner_key.to_string(),
            content: payload.content,
            media_urls: payload.media_urls,
            scheduled_at,
            platforms,
            status: if scheduled_at.is_some() {
                PostStatus::Scheduled
            } else {
                PostStatus::Draft
            },
            results: Default::default(),
            attempts: 0,
            created_at: now,
        };

        self.store.insert_post(&post).await?;
        tracing::info!(
            post_id = %post.id,
            status = %post.status,
            platforms = post.platforms.len(),
            "Created post"
        );
        Ok(post)
    }

    pub async fn list_posts(&self) -> Result<Vec<SocialPost>> {
        self.store.list_posts().await
    }

    pub async fn get_post(&self, post_id: &str) -> Result<SocialPost> {
        self.store
            .get_post(post_id)
            .await?
            .ok_or_else(|| RealtycastError::NotFound(format!("post {}", post_id)))
    }

    pub async fn claim_due_posts(&self, now: i64) -> Result<Vec<SocialPost>> {
        self.store.claim_due_posts(now).await
    }

    pub async fn record_result(&self, post_id: &str, result: &PublishResult) -> Result<()> {
        self.store.record_result(post_id, result).await
    }

    pub async fn finalize(&self, post_id: &str) -> Result<PostStatus> {
        self.store.finalize(post_id).await
    }

    pub async fn requeue(&self, post_id: &str, at: i64) -> Result<bool> {
        self.store.requeue(post_id, at).await
    }

    pub async fn settle(&self, post_id: &str, status: PostStatus) -> Result<bool> {
        self.store.settle(post_id, status).await
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        if self.store.delete_post(post_id).await? {
            Ok(())
        } else {
            Err(RealtycastError::NotFound(format!("post {}", post_id)))
        }
    }
}
