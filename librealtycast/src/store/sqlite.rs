//! SQLite storage backend

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Transaction};

use super::{PostStore, TokenRepository};
use crate::error::{DbError, RealtycastError, Result};
use crate::types::{
    now_ts, OAuthToken, Platform, PostStatus, PublishResult, PublishStatus, SocialPost,
};

const POST_COLUMNS: &str =
    "id, owner_key, content, media_urls, scheduled_at, platforms, status, attempts, created_at";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and run migrations
    pub async fn new(db_path: &Path) -> Result<Self> {
        let expanded = shellexpand::tilde(&db_path.to_string_lossy()).to_string();
        let path = Path::new(&expanded);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes keep the URL valid on Windows too
        let db_url = format!("sqlite://{}?mode=rwc", expanded.replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(DbError::SqlxError)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// Private in-memory database, for tests and throwaway runs
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DbError::SqlxError)?
            .foreign_keys(true);

        // Every connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;
        Ok(Self { pool })
    }

    /// Transaction holding the write lock from its first statement
    ///
    /// A deferred transaction that reads before writing fails with
    /// SQLITE_BUSY_SNAPSHOT when another connection commits in between, and
    /// the busy timeout does not cover that case.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(DbError::SqlxError)?)
    }

    async fn load_results(&self, post_id: &str) -> Result<BTreeMap<Platform, PublishResult>> {
        let rows = sqlx::query(
            r#"
            SELECT platform, status, external_id, error, attempted_at
            FROM publish_results WHERE post_id = ?
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|row| {
                let result = result_from_row(row)?;
                Ok((result.platform, result))
            })
            .collect()
    }
}

fn corrupt(what: impl Into<String>) -> RealtycastError {
    DbError::Corrupt(what.into()).into()
}

fn parse_platform(raw: &str) -> Result<Platform> {
    raw.parse().map_err(corrupt)
}

fn publish_status_str(status: PublishStatus) -> &'static str {
    match status {
        PublishStatus::Success => "success",
        PublishStatus::Failure => "failure",
    }
}

fn result_from_row(row: &SqliteRow) -> Result<PublishResult> {
    let status = match row.get::<String, _>("status").as_str() {
        "success" => PublishStatus::Success,
        "failure" => PublishStatus::Failure,
        other => return Err(corrupt(format!("unknown result status '{}'", other))),
    };
    Ok(PublishResult {
        platform: parse_platform(&row.get::<String, _>("platform"))?,
        status,
        external_id: row.get("external_id"),
        error: row.get("error"),
        attempted_at: row.get("attempted_at"),
    })
}

/// Map a post row; results are loaded separately
fn post_from_row(row: &SqliteRow) -> Result<SocialPost> {
    let media_urls: Vec<String> = serde_json::from_str(&row.get::<String, _>("media_urls"))
        .map_err(|e| corrupt(format!("media_urls: {}", e)))?;

    let platform_names: Vec<String> = serde_json::from_str(&row.get::<String, _>("platforms"))
        .map_err(|e| corrupt(format!("platforms: {}", e)))?;
    let platforms = platform_names
        .iter()
        .map(|name| parse_platform(name))
        .collect::<Result<BTreeSet<Platform>>>()?;

    let status = row
        .get::<String, _>("status")
        .parse::<PostStatus>()
        .map_err(corrupt)?;

    let attempts: i64 = row.get("attempts");

    Ok(SocialPost {
        id: row.get("id"),
        owner_key: row.get("owner_key"),
        content: row.get("content"),
        media_urls,
        scheduled_at: row.get("scheduled_at"),
        platforms,
        status,
        results: BTreeMap::new(),
        attempts: u32::try_from(attempts).unwrap_or(0),
        created_at: row.get("created_at"),
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| corrupt(format!("encode: {}", e)))
}

fn not_found(post_id: &str) -> RealtycastError {
    RealtycastError::NotFound(format!("post {}", post_id))
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn insert_post(&self, post: &SocialPost) -> Result<()> {
        let platforms: Vec<&str> = post.platforms.iter().map(Platform::as_str).collect();

        sqlx::query(
            r#"
            INSERT INTO social_posts
                (id, owner_key, content, media_urls, scheduled_at, platforms, status, attempts, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.owner_key)
        .bind(&post.content)
        .bind(encode_json(&post.media_urls)?)
        .bind(post.scheduled_at)
        .bind(encode_json(&platforms)?)
        .bind(post.status.as_str())
        .bind(i64::from(post.attempts))
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        for result in post.results.values() {
            self.record_result(&post.id, result).await?;
        }

        Ok(())
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<SocialPost>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM social_posts WHERE id = ?",
            POST_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        match row {
            Some(row) => {
                let mut post = post_from_row(&row)?;
                post.results = self.load_results(&post.id).await?;
                Ok(Some(post))
            }
            None => Ok(None),
        }
    }

    async fn list_posts(&self) -> Result<Vec<SocialPost>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM social_posts
            ORDER BY scheduled_at IS NULL, scheduled_at ASC, created_at DESC
            "#,
            POST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut post = post_from_row(row)?;
            post.results = self.load_results(&post.id).await?;
            posts.push(post);
        }
        Ok(posts)
    }

    async fn claim_due_posts(&self, now: i64) -> Result<Vec<SocialPost>> {
        // Single statement: selection and transition cannot interleave
        let rows = sqlx::query(&format!(
            r#"
            UPDATE social_posts SET status = 'publishing'
            WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?
            RETURNING {}
            "#,
            POST_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut claimed = rows
            .iter()
            .map(post_from_row)
            .collect::<Result<Vec<SocialPost>>>()?;
        claimed.sort_by_key(|post| post.scheduled_at);
        Ok(claimed)
    }

    async fn record_result(&self, post_id: &str, result: &PublishResult) -> Result<()> {
        let outcome = sqlx::query(
            r#"
            INSERT INTO publish_results (post_id, platform, status, external_id, error, attempted_at)
            SELECT id, ?, ?, ?, ?, ? FROM social_posts WHERE id = ?
            ON CONFLICT (post_id, platform) DO UPDATE SET
                status = excluded.status,
                external_id = excluded.external_id,
                error = excluded.error,
                attempted_at = excluded.attempted_at
            "#,
        )
        .bind(result.platform.as_str())
        .bind(publish_status_str(result.status))
        .bind(&result.external_id)
        .bind(&result.error)
        .bind(result.attempted_at)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if outcome.rows_affected() == 0 {
            return Err(not_found(post_id));
        }
        Ok(())
    }

    async fn finalize(&self, post_id: &str) -> Result<PostStatus> {
        let mut tx = self.begin_write().await?;

        let row = sqlx::query("SELECT platforms FROM social_posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?
            .ok_or_else(|| not_found(post_id))?;
        let platform_names: Vec<String> = serde_json::from_str(&row.get::<String, _>("platforms"))
            .map_err(|e| corrupt(format!("platforms: {}", e)))?;
        let platforms = platform_names
            .iter()
            .map(|name| parse_platform(name))
            .collect::<Result<BTreeSet<Platform>>>()?;

        let result_rows = sqlx::query(
            "SELECT platform, status, external_id, error, attempted_at FROM publish_results WHERE post_id = ?",
        )
        .bind(post_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;
        let results = result_rows
            .iter()
            .map(|row| result_from_row(row).map(|r| (r.platform, r)))
            .collect::<Result<BTreeMap<Platform, PublishResult>>>()?;

        let status = PostStatus::from_results(&platforms, &results).ok_or_else(|| {
            RealtycastError::Validation(format!("post {} is missing platform results", post_id))
        })?;

        sqlx::query("UPDATE social_posts SET status = ?, attempts = attempts + 1 WHERE id = ?")
            .bind(status.as_str())
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(status)
    }

    async fn requeue(&self, post_id: &str, at: i64) -> Result<bool> {
        let mut tx = self.begin_write().await?;

        let updated = sqlx::query(
            "UPDATE social_posts SET status = 'scheduled', scheduled_at = ? WHERE id = ? AND status = 'failed'",
        )
        .bind(at)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM social_posts WHERE id = ?")
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;
            return match exists {
                Some(_) => Ok(false),
                None => Err(not_found(post_id)),
            };
        }

        sqlx::query("DELETE FROM publish_results WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(true)
    }

    async fn settle(&self, post_id: &str, status: PostStatus) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE social_posts SET status = ?, attempts = attempts + 1 WHERE id = ? AND status = 'publishing'",
        )
        .bind(status.as_str())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(updated.rows_affected() > 0)
    }

    async fn delete_post(&self, post_id: &str) -> Result<bool> {
        let mut tx = self.begin_write().await?;

        sqlx::query("DELETE FROM publish_results WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        let deleted = sqlx::query("DELETE FROM social_posts WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[async_trait]
impl TokenRepository for SqliteStore {
    async fn upsert_token(&self, token: &OAuthToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_tokens (platform, owner_key, access_token, refresh_token, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (platform, owner_key) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(token.platform.as_str())
        .bind(&token.owner_key)
        .bind(token.access_token.expose_secret())
        .bind(token.refresh_token.as_ref().map(|t| t.expose_secret().to_string()))
        .bind(token.expires_at)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn get_token(&self, platform: Platform, owner_key: &str) -> Result<Option<OAuthToken>> {
        let row = sqlx::query(
            r#"
            SELECT access_token, refresh_token, expires_at
            FROM oauth_tokens WHERE platform = ? AND owner_key = ?
            "#,
        )
        .bind(platform.as_str())
        .bind(owner_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| {
            let access: String = r.get("access_token");
            let refresh: Option<String> = r.get("refresh_token");
            OAuthToken::new(
                platform,
                owner_key,
                &access,
                refresh.as_deref(),
                r.get("expires_at"),
            )
        }))
    }

    async fn delete_token(&self, platform: Platform, owner_key: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM oauth_tokens WHERE platform = ? AND owner_key = ?")
            .bind(platform.as_str())
            .bind(owner_key)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scheduled(id: &str, at: i64) -> SocialPost {
        SocialPost {
            id: id.to_string(),
            owner_key: "admin-1".to_string(),
            content: "Open house Saturday".to_string(),
            media_urls: vec!["https://cdn.example.com/house.jpg".to_string()],
            scheduled_at: Some(at),
            platforms: BTreeSet::from([Platform::Facebook, Platform::Instagram]),
            status: PostStatus::Scheduled,
            results: BTreeMap::new(),
            attempts: 0,
            created_at: 1,
        }
    }

    async fn create_test_db() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("social.db");
        let store = SqliteStore::new(&db_path).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let post = scheduled("p1", 100);
        store.insert_post(&post).await.unwrap();

        let loaded = store.get_post("p1").await.unwrap().unwrap();
        assert_eq!(loaded, post);
        assert!(store.get_post("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_transitions_once() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_post(&scheduled("due", 100)).await.unwrap();
        store.insert_post(&scheduled("future", 1_000)).await.unwrap();

        let claimed = store.claim_due_posts(500).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, "due");
        assert_eq!(claimed[0].status, PostStatus::Publishing);

        assert!(store.claim_due_posts(500).await.unwrap().is_empty());
        let stored = store.get_post("due").await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Publishing);
    }

    #[tokio::test]
    async fn test_concurrent_claims_on_shared_file() {
        let (first, _dir) = create_test_db().await;
        for i in 0..30 {
            first.insert_post(&scheduled(&format!("p{}", i), i)).await.unwrap();
        }
        let second = first.clone();

        let (a, b) = tokio::join!(first.claim_due_posts(1_000), second.claim_due_posts(1_000));
        let (a, b) = (a.unwrap(), b.unwrap());

        let mut ids: Vec<String> = a.into_iter().chain(b).map(|p| p.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 30);
    }

    #[tokio::test]
    async fn test_record_finalize_and_requeue() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_post(&scheduled("p", 0)).await.unwrap();
        store.claim_due_posts(10).await.unwrap();

        store
            .record_result("p", &PublishResult::failure(Platform::Facebook, "HTTP 500".into(), 10))
            .await
            .unwrap();
        assert!(store.finalize("p").await.is_err());

        store
            .record_result("p", &PublishResult::failure(Platform::Instagram, "media".into(), 10))
            .await
            .unwrap();
        assert_eq!(store.finalize("p").await.unwrap(), PostStatus::Failed);

        let failed = store.get_post("p").await.unwrap().unwrap();
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.results.len(), 2);

        assert!(store.requeue("p", 700).await.unwrap());
        let requeued = store.get_post("p").await.unwrap().unwrap();
        assert_eq!(requeued.status, PostStatus::Scheduled);
        assert_eq!(requeued.scheduled_at, Some(700));
        assert!(requeued.results.is_empty());

        assert!(!store.requeue("p", 800).await.unwrap());
        assert!(matches!(
            store.requeue("ghost", 800).await,
            Err(RealtycastError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_finalize_on_shared_file() {
        let (store, _dir) = create_test_db().await;
        for i in 0..50 {
            store.insert_post(&scheduled(&format!("p{}", i), 0)).await.unwrap();
        }
        let claimed = store.claim_due_posts(10).await.unwrap();
        assert_eq!(claimed.len(), 50);

        let tasks: Vec<_> = claimed
            .into_iter()
            .map(|post| {
                let store = store.clone();
                tokio::spawn(async move {
                    for platform in [Platform::Facebook, Platform::Instagram] {
                        store
                            .record_result(&post.id, &PublishResult::success(platform, "x".into(), 10))
                            .await?;
                    }
                    store.finalize(&post.id).await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), PostStatus::Published);
        }
        let posts = store.list_posts().await.unwrap();
        assert!(posts.iter().all(|p| p.status == PostStatus::Published && p.attempts == 1));
    }

    #[tokio::test]
    async fn test_settle_only_moves_publishing_posts() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_post(&scheduled("p", 0)).await.unwrap();
        assert!(!store.settle("p", PostStatus::Failed).await.unwrap());

        store.claim_due_posts(10).await.unwrap();
        assert!(store.settle("p", PostStatus::Partial).await.unwrap());
        assert!(!store.settle("p", PostStatus::Failed).await.unwrap());

        let settled = store.get_post("p").await.unwrap().unwrap();
        assert_eq!(settled.status, PostStatus::Partial);
        assert_eq!(settled.attempts, 1);
        assert!(!store.settle("ghost", PostStatus::Failed).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_result_unknown_post() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store
            .record_result("ghost", &PublishResult::success(Platform::Twitter, "1".into(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, RealtycastError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_orders_scheduled_before_drafts() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut draft_old = scheduled("draft-old", 0);
        draft_old.scheduled_at = None;
        draft_old.status = PostStatus::Draft;
        draft_old.created_at = 1;
        let mut draft_new = draft_old.clone();
        draft_new.id = "draft-new".to_string();
        draft_new.created_at = 9;

        store.insert_post(&draft_old).await.unwrap();
        store.insert_post(&scheduled("late", 900)).await.unwrap();
        store.insert_post(&draft_new).await.unwrap();
        store.insert_post(&scheduled("early", 100)).await.unwrap();

        let ids: Vec<String> = store
            .list_posts()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["early", "late", "draft-new", "draft-old"]);
    }

    #[tokio::test]
    async fn test_delete_post_removes_results() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_post(&scheduled("p", 0)).await.unwrap();
        store
            .record_result("p", &PublishResult::success(Platform::Facebook, "fb".into(), 1))
            .await
            .unwrap();

        assert!(store.delete_post("p").await.unwrap());
        assert!(store.get_post("p").await.unwrap().is_none());
        assert!(!store.delete_post("p").await.unwrap());
    }

    #[tokio::test]
    async fn test_tokens_persist_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("social.db");

        {
            let store = SqliteStore::new(&db_path).await.unwrap();
            store
                .upsert_token(&OAuthToken::new(Platform::Pinterest, "admin-1", "acc", Some("ref"), 99))
                .await
                .unwrap();
        }

        let store = SqliteStore::new(&db_path).await.unwrap();
        let token = store
            .get_token(Platform::Pinterest, "admin-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.access_token.expose_secret(), "acc");
        assert_eq!(
            token.refresh_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("ref".to_string())
        );
        assert_eq!(token.expires_at, 99);

        assert!(store.delete_token(Platform::Pinterest, "admin-1").await.unwrap());
        assert!(store.get_token(Platform::Pinterest, "admin-1").await.unwrap().is_none());
    }
}
