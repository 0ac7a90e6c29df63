//! In-process storage backend

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{sort_for_listing, PostStore, TokenRepository};
use crate::error::{RealtycastError, Result};
use crate::types::{OAuthToken, Platform, PostStatus, PublishResult, SocialPost};

/// Posts and tokens held in memory, each behind a single mutex
///
/// Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    posts: Mutex<HashMap<String, SocialPost>>,
    tokens: Mutex<HashMap<(Platform, String), OAuthToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn posts(&self) -> MutexGuard<'_, HashMap<String, SocialPost>> {
        self.posts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<(Platform, String), OAuthToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(post_id: &str) -> RealtycastError {
    RealtycastError::NotFound(format!("post {}", post_id))
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert_post(&self, post: &SocialPost) -> Result<()> {
        let mut posts = self.posts();
        if posts.contains_key(&post.id) {
            return Err(RealtycastError::Validation(format!(
                "post {} already exists",
                post.id
            )));
        }
        posts.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<SocialPost>> {
        Ok(self.posts().get(post_id).cloned())
    }

    async fn list_posts(&self) -> Result<Vec<SocialPost>> {
        let mut posts: Vec<SocialPost> = self.posts().values().cloned().collect();
        sort_for_listing(&mut posts);
        Ok(posts)
    }

    async fn claim_due_posts(&self, now: i64) -> Result<Vec<SocialPost>> {
        let mut posts = self.posts();
        let mut claimed: Vec<SocialPost> = posts
            .values_mut()
            .filter(|post| post.is_due(now))
            .map(|post| {
                post.status = PostStatus::Publishing;
                post.clone()
            })
            .collect();
        claimed.sort_by_key(|post| post.scheduled_at);
        Ok(claimed)
    }

    async fn record_result(&self, post_id: &str, result: &PublishResult) -> Result<()> {
        let mut posts = self.posts();
        let post = posts.get_mut(post_id).ok_or_else(|| not_found(post_id))?;
        post.results.insert(result.platform, result.clone());
        Ok(())
    }

    async fn finalize(&self, post_id: &str) -> Result<PostStatus> {
        let mut posts = self.posts();
        let post = posts.get_mut(post_id).ok_or_else(|| not_found(post_id))?;
        let status = PostStatus::from_results(&post.platforms, &post.results).ok_or_else(|| {
            RealtycastError::Validation(format!("post {} is missing platform results", post_id))
        })?;
        post.status = status;
        post.attempts += 1;
        Ok(status)
    }

    async fn requeue(&self, post_id: &str, at: i64) -> Result<bool> {
        let mut posts = self.posts();
        let post = posts.get_mut(post_id).ok_or_else(|| not_found(post_id))?;
        if post.status != PostStatus::Failed {
            return Ok(false);
        }
        post.status = PostStatus::Scheduled;
        post.scheduled_at = Some(at);
        post.results.clear();
        Ok(true)
    }

    async fn settle(&self, post_id: &str, status: PostStatus) -> Result<bool> {
        let mut posts = self.posts();
        match posts.get_mut(post_id) {
            Some(post) if post.status == PostStatus::Publishing => {
                post.status = status;
                post.attempts += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_post(&self, post_id: &str) -> Result<bool> {
        Ok(self.posts().remove(post_id).is_some())
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn upsert_token(&self, token: &OAuthToken) -> Result<()> {
        self.tokens()
            .insert((token.platform, token.owner_key.clone()), token.clone());
        Ok(())
    }

    async fn get_token(&self, platform: Platform, owner_key: &str) -> Result<Option<OAuthToken>> {
        Ok(self
            .tokens()
            .get(&(platform, owner_key.to_string()))
            .cloned())
    }

    async fn delete_token(&self, platform: Platform, owner_key: &str) -> Result<bool> {
        Ok(self
            .tokens()
            .remove(&(platform, owner_key.to_string()))
            .is_some())
    }
}
