//! User accounts.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::db::Timestamp;

const USER_COLUMNS: &str = "id, username, email, display_name, password_hash, created_at, updated_at";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: Timestamp,
    #[serde(skip_serializing)]
    pub updated_at: Timestamp,
}

/// Fields needed to create an account. The password is already hashed.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub display_name: Option<&'a str>,
    pub password_hash: &'a str,
}

impl User {
    pub async fn create(pool: &SqlitePool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
        let now = Timestamp::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username.to_string(),
            email: new.email.to_string(),
            display_name: new.display_name.map(str::to_string),
            password_hash: new.password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO users (id, username, email, display_name, password_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive lookup by username.
    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// Login lookup: `identifier` may be a username or an email.
    pub async fn find_by_identifier(pool: &SqlitePool, identifier: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ? OR email = ? LIMIT 1"
        ))
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(pool)
        .await
    }

    /// Which of `username` / `email` are already registered.
    pub async fn taken(pool: &SqlitePool, username: &str, email: &str) -> Result<(bool, bool), sqlx::Error> {
        let (username_taken, email_taken): (bool, bool) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?),
                    EXISTS(SELECT 1 FROM users WHERE email = ?)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(pool)
        .await?;
        Ok((username_taken, email_taken))
    }

    pub async fn update_password(pool: &SqlitePool, id: Uuid, password_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Timestamp::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
