//! Storage backends for posts and OAuth tokens
//!
//! The engine only talks to the [`PostStore`] and [`TokenRepository`] traits.
//! [`MemoryStore`] keeps everything behind a mutex and suits tests and
//! single-process deployments; [`SqliteStore`] persists to disk.
//!
//! Every mutating method is one short critical section (a mutex or a single
//! SQL statement/transaction). No method holds a lock across an `.await`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, StorageBackend};
use crate::error::Result;
use crate::types::{OAuthToken, Platform, PostStatus, PublishResult, SocialPost};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert_post(&self, post: &SocialPost) -> Result<()>;

    async fn get_post(&self, post_id: &str) -> Result<Option<SocialPost>>;

    /// Scheduled posts by `scheduled_at` ascending, then unscheduled posts
    /// by `created_at` descending
    async fn list_posts(&self) -> Result<Vec<SocialPost>>;

    /// Select every `scheduled` post due at `now` and mark it `publishing`
    ///
    /// Selection and transition happen in one atomic step, so two callers
    /// racing on the same store never receive the same post.
    async fn claim_due_posts(&self, now: i64) -> Result<Vec<SocialPost>>;

    /// Store the outcome for one platform, replacing any earlier entry
    async fn record_result(&self, post_id: &str, result: &PublishResult) -> Result<()>;

    /// Compute and persist the terminal status once every platform has a result
    ///
    /// Also counts the attempt. Fails with a validation error while results
    /// are missing.
    async fn finalize(&self, post_id: &str) -> Result<PostStatus>;

    /// Put a `failed` post back on the schedule at `at`, clearing its results
    ///
    /// Returns `false` if the post is not in `failed` state.
    async fn requeue(&self, post_id: &str, at: i64) -> Result<bool>;

    /// Move a `publishing` post straight to `status`, counting the attempt
    ///
    /// Used when its results could not be stored. Returns `false` if the
    /// post is no longer `publishing`.
    async fn settle(&self, post_id: &str, status: PostStatus) -> Result<bool>;

    async fn delete_post(&self, post_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Insert or overwrite the token for `(token.platform, token.owner_key)`
    async fn upsert_token(&self, token: &OAuthToken) -> Result<()>;

    async fn get_token(&self, platform: Platform, owner_key: &str) -> Result<Option<OAuthToken>>;

    async fn delete_token(&self, platform: Platform, owner_key: &str) -> Result<bool>;
}

/// Both halves of a backend, shared
#[derive(Clone)]
pub struct Stores {
    pub posts: Arc<dyn PostStore>,
    pub tokens: Arc<dyn TokenRepository>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            posts: store.clone(),
            tokens: store,
        }
    }

    pub fn sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self {
            posts: store.clone(),
            tokens: store,
        }
    }

    /// Open the backend named in the config
    pub async fn from_config(config: &Config) -> Result<Self> {
        match config.database.backend {
            StorageBackend::Memory => Ok(Self::memory()),
            StorageBackend::Sqlite => {
                let path = config.database_path();
                Ok(Self::sqlite(SqliteStore::new(&path).await?))
            }
        }
    }
}

/// Ordering used by `list_posts` for backends without SQL sorting
pub(crate) fn sort_for_listing(posts: &mut [SocialPost]) {
    posts.sort_by(|a, b| match (a.scheduled_at, b.scheduled_at) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| b.created_at.cmp(&a.created_at)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.created_at.cmp(&a.created_at),
    });
}
