//! One sweep over due posts
//!
//! There is no background loop. Something external (cron, the HTTP route,
//! the `realtycast-send` CLI) calls [`Scheduler::run`]; each call claims the
//! posts due at that moment and publishes them. Overlapping runs are safe
//! because claiming is atomic in the store.

use std::collections::BTreeMap;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{FailurePolicy, SchedulingConfig};
use crate::error::Result;
use crate::posts::PostRepository;
use crate::publisher::Publisher;
use crate::types::{Platform, PostStatus, PublishResult, SocialPost};

/// Outcome for one claimed post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerPostResult {
    pub post_id: String,
    pub status: PostStatus,
    pub results: Vec<PublishResult>,
    /// Set when the failure policy put the post back on the schedule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requeued_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerRun {
    pub published: Vec<PerPostResult>,
    pub duration_ms: u64,
}

#[derive(Clone)]
pub struct Scheduler {
    posts: PostRepository,
    publisher: Publisher,
    max_concurrent_posts: usize,
    failure_policy: FailurePolicy,
}

impl Scheduler {
    pub fn new(posts: PostRepository, publisher: Publisher, config: &SchedulingConfig) -> Self {
        Self {
            posts,
            publisher,
            max_concurrent_posts: config.max_concurrent_posts.max(1),
            failure_policy: config.failure_policy,
        }
    }

    /// Claim every post due at `now` and publish it to all its platforms
    ///
    /// Platform failures never fail the run; they show up in the per-post
    /// results. Every claimed post appears in the returned list. If its
    /// results cannot be stored, the post is settled directly from the
    /// in-memory outcome and is not requeued.
    pub async fn run(&self, now: i64) -> Result<SchedulerRun> {
        let started = Instant::now();
        let claimed = self.posts.claim_due_posts(now).await?;

        if claimed.is_empty() {
            return Ok(SchedulerRun {
                published: Vec::new(),
                duration_ms: elapsed_ms(started),
            });
        }

        info!(count = claimed.len(), "Claimed due posts");

        let published: Vec<PerPostResult> = stream::iter(claimed)
            .map(|post| self.process(post, now))
            .buffered(self.max_concurrent_posts)
            .collect()
            .await;

        let run = SchedulerRun {
            published,
            duration_ms: elapsed_ms(started),
        };
        info!(posts = run.published.len(), duration_ms = run.duration_ms, "Scheduler run complete");
        Ok(run)
    }

    async fn process(&self, post: SocialPost, now: i64) -> PerPostResult {
        let results = self
            .publisher
            .publish_to_all(&post.platforms, &post.payload(), &post.owner_key)
            .await;

        let status = match self.store_outcome(&post.id, &results).await {
            Ok(status) => status,
            Err(e) => {
                error!(post_id = %post.id, error = %e, "Failed to store publish results");
                return self.settle_unrecorded(post, results).await;
            }
        };

        let requeued_at = match (status, self.failure_policy) {
            (
                PostStatus::Failed,
                FailurePolicy::Requeue {
                    max_attempts,
                    delay_secs,
                },
            ) if post.attempts + 1 < max_attempts => {
                let at = now.saturating_add(i64::try_from(delay_secs).unwrap_or(i64::MAX));
                match self.posts.requeue(&post.id, at).await {
                    Ok(true) => {
                        warn!(post_id = %post.id, attempt = post.attempts + 1, retry_at = at, "Every platform failed, requeued");
                        Some(at)
                    }
                    Ok(false) => None,
                    Err(e) => {
                        error!(post_id = %post.id, error = %e, "Failed to requeue post, leaving it failed");
                        None
                    }
                }
            }
            _ => None,
        };

        info!(post_id = %post.id, status = %status, "Post processed");
        PerPostResult {
            post_id: post.id,
            status: if requeued_at.is_some() {
                PostStatus::Scheduled
            } else {
                status
            },
            results,
            requeued_at,
        }
    }

    async fn store_outcome(&self, post_id: &str, results: &[PublishResult]) -> Result<PostStatus> {
        for result in results {
            self.posts.record_result(post_id, result).await?;
        }
        self.posts.finalize(post_id).await
    }

    /// Best-effort exit from `publishing` when the results could not be stored
    async fn settle_unrecorded(&self, post: SocialPost, results: Vec<PublishResult>) -> PerPostResult {
        let by_platform: BTreeMap<Platform, PublishResult> =
            results.iter().map(|r| (r.platform, r.clone())).collect();
        let status =
            PostStatus::from_results(&post.platforms, &by_platform).unwrap_or(PostStatus::Failed);

        let status = match self.posts.settle(&post.id, status).await {
            Ok(true) => {
                warn!(post_id = %post.id, status = %status, "Post settled without stored results");
                status
            }
            Ok(false) => match self.posts.get_post(&post.id).await {
                Ok(stored) => stored.status,
                Err(_) => PostStatus::Publishing,
            },
            Err(e) => {
                error!(post_id = %post.id, error = %e, "Post left in publishing");
                PostStatus::Publishing
            }
        };

        PerPostResult {
            post_id: post.id,
            status,
            results,
            requeued_at: None,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
