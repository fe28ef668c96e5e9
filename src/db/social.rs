//! Posts, comments and likes.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::db::Timestamp;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A post with its author and counters, as seen by one viewer.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PostView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked_by_me: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: Timestamp,
}

/// Partial update. `image_url: Some(None)` clears the image.
#[derive(Debug, Default)]
pub struct PostChanges<'a> {
    pub content: Option<&'a str>,
    pub image_url: Option<Option<&'a str>>,
}

// First placeholder is the viewer id (NULL for anonymous).
const VIEW_SELECT: &str = "SELECT p.id, p.user_id, u.username AS author_username, p.content, p.image_url,
            p.created_at, p.updated_at,
            (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS like_count,
            (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
            EXISTS(SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = ?) AS liked_by_me
     FROM posts p JOIN users u ON u.id = p.user_id";

impl Post {
    /// `created_at` is strictly increasing across all posts, so it is an exact feed cursor.
    pub async fn create(pool: &SqlitePool, user_id: Uuid, content: &str, image_url: Option<&str>) -> Result<Post, sqlx::Error> {
        sqlx::query_as::<_, Post>(
            "INSERT INTO posts (id, user_id, content, image_url, created_at, updated_at)
             SELECT ?, ?, ?, ?, t.ts, t.ts
             FROM (SELECT MAX(?, COALESCE((SELECT MAX(created_at) + 1 FROM posts), 0)) AS ts) t
             RETURNING id, user_id, content, image_url, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(content)
        .bind(image_url)
        .bind(Timestamp::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find(pool: &SqlitePool, id: Uuid) -> Result<Option<Post>, sqlx::Error> {
        sqlx::query_as::<_, Post>(
            "SELECT id, user_id, content, image_url, created_at, updated_at FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, changes: PostChanges<'_>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE posts SET
                content = COALESCE(?, content),
                image_url = CASE WHEN ? THEN ? ELSE image_url END,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(changes.content)
        .bind(changes.image_url.is_some())
        .bind(changes.image_url.flatten())
        .bind(Timestamp::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes the post; comments and likes cascade.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Idempotent. Returns the new like count.
    pub async fn like(pool: &SqlitePool, post_id: Uuid, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(user_id)
            .bind(Timestamp::now())
            .execute(pool)
            .await?;
        Self::like_count(pool, post_id).await
    }

    /// Idempotent. Returns the new like count.
    pub async fn unlike(pool: &SqlitePool, post_id: Uuid, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Self::like_count(pool, post_id).await
    }

    pub async fn like_count(pool: &SqlitePool, post_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

impl PostView {
    pub async fn find(pool: &SqlitePool, id: Uuid, viewer: Option<Uuid>) -> Result<Option<PostView>, sqlx::Error> {
        sqlx::query_as::<_, PostView>(&format!("{VIEW_SELECT} WHERE p.id = ?"))
            .bind(viewer)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Feed page, newest first. `author` narrows it to one user.
    pub async fn page(
        pool: &SqlitePool,
        viewer: Option<Uuid>,
        author: Option<Uuid>,
        before: Option<Timestamp>,
        limit: i64,
    ) -> Result<Vec<PostView>, sqlx::Error> {
        sqlx::query_as::<_, PostView>(&format!(
            "{VIEW_SELECT}
             WHERE (? IS NULL OR p.user_id = ?)
               AND (? IS NULL OR p.created_at < ?)
             ORDER BY p.created_at DESC, p.rowid DESC
             LIMIT ?"
        ))
        .bind(viewer)
        .bind(author)
        .bind(author)
        .bind(before)
        .bind(before)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.user_id, u.username AS author_username, c.content, c.created_at
     FROM comments c JOIN users u ON u.id = c.user_id";

impl Comment {
    pub async fn create(pool: &SqlitePool, post_id: Uuid, user_id: Uuid, content: &str) -> Result<Comment, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO comments (id, post_id, user_id, content, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(id)
            .bind(post_id)
            .bind(user_id)
            .bind(content)
            .bind(Timestamp::now())
            .execute(pool)
            .await?;

        sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = ?"))
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn find(pool: &SqlitePool, id: Uuid) -> Result<Option<Comment>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Oldest first.
    pub async fn list_for_post(pool: &SqlitePool, post_id: Uuid) -> Result<Vec<Comment>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.post_id = ? ORDER BY c.created_at, c.rowid"
        ))
        .bind(post_id)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
