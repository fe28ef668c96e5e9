//! Chat rooms, memberships and messages.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::db::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Member,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub owner_id: Uuid,
    pub created_at: Timestamp,
}

/// A room as listed to a particular viewer.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RoomSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub room: ChatRoom,
    pub member_count: i64,
    pub is_member: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChatMember {
    pub user_id: Uuid,
    pub username: String,
    pub role: MemberRole,
    pub joined_at: Timestamp,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub content: String,
    pub created_at: Timestamp,
}

const MESSAGE_SELECT: &str = "SELECT m.id, m.room_id, m.user_id, u.username, m.content, m.created_at
     FROM chat_messages m JOIN users u ON u.id = m.user_id";

impl ChatRoom {
    /// Create a room and enroll `owner_id` as its owner in one transaction.
    pub async fn create(
        pool: &SqlitePool,
        owner_id: Uuid,
        name: &str,
        description: Option<&str>,
        is_private: bool,
    ) -> Result<ChatRoom, sqlx::Error> {
        let room = ChatRoom {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            is_private,
            owner_id,
            created_at: Timestamp::now(),
        };

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO chat_rooms (id, name, description, is_private, owner_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(room.id)
        .bind(&room.name)
        .bind(&room.description)
        .bind(room.is_private)
        .bind(room.owner_id)
        .bind(room.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO chat_members (room_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)")
            .bind(room.id)
            .bind(owner_id)
            .bind(MemberRole::Owner)
            .bind(room.created_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(room)
    }

    pub async fn find(pool: &SqlitePool, id: Uuid) -> Result<Option<ChatRoom>, sqlx::Error> {
        sqlx::query_as::<_, ChatRoom>(
            "SELECT id, name, description, is_private, owner_id, created_at FROM chat_rooms WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Public rooms plus private rooms `viewer` belongs to, newest first.
    pub async fn list_visible(pool: &SqlitePool, viewer: Uuid) -> Result<Vec<RoomSummary>, sqlx::Error> {
        sqlx::query_as::<_, RoomSummary>(
            "SELECT r.id, r.name, r.description, r.is_private, r.owner_id, r.created_at,
                    (SELECT COUNT(*) FROM chat_members m WHERE m.room_id = r.id) AS member_count,
                    EXISTS(SELECT 1 FROM chat_members m WHERE m.room_id = r.id AND m.user_id = ?) AS is_member
             FROM chat_rooms r
             WHERE r.is_private = 0
                OR EXISTS(SELECT 1 FROM chat_members m WHERE m.room_id = r.id AND m.user_id = ?)
             ORDER BY r.created_at DESC, r.rowid DESC",
        )
        .bind(viewer)
        .bind(viewer)
        .fetch_all(pool)
        .await
    }

    /// Deletes the room; members and messages cascade.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chat_rooms WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn member_role(pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> Result<Option<MemberRole>, sqlx::Error> {
        let row: Option<(MemberRole,)> =
            sqlx::query_as("SELECT role FROM chat_members WHERE room_id = ? AND user_id = ?")
                .bind(room_id)
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(role,)| role))
    }

    /// Add a plain member. Returns false if they were already in the room.
    pub async fn add_member(pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO chat_members (room_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(MemberRole::Member)
        .bind(Timestamp::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_member(pool: &SqlitePool, room_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chat_members WHERE room_id = ? AND user_id = ?")
            .bind(room_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn members(pool: &SqlitePool, room_id: Uuid) -> Result<Vec<ChatMember>, sqlx::Error> {
        sqlx::query_as::<_, ChatMember>(
            "SELECT m.user_id, u.username, m.role, m.joined_at
             FROM chat_members m JOIN users u ON u.id = m.user_id
             WHERE m.room_id = ?
             ORDER BY m.joined_at, m.rowid",
        )
        .bind(room_id)
        .fetch_all(pool)
        .await
    }
}

impl ChatMessage {
    /// `created_at` is strictly increasing within a room, so it is an exact history cursor.
    pub async fn create(pool: &SqlitePool, room_id: Uuid, user_id: Uuid, content: &str) -> Result<ChatMessage, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO chat_messages (id, room_id, user_id, content, created_at)
             VALUES (?, ?, ?, ?, MAX(?, COALESCE((SELECT MAX(created_at) + 1 FROM chat_messages WHERE room_id = ?), 0)))",
        )
        .bind(id)
        .bind(room_id)
        .bind(user_id)
        .bind(content)
        .bind(Timestamp::now())
        .bind(room_id)
        .execute(pool)
        .await?;

        sqlx::query_as::<_, ChatMessage>(&format!("{MESSAGE_SELECT} WHERE m.id = ?"))
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn find(pool: &SqlitePool, id: Uuid) -> Result<Option<ChatMessage>, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(&format!("{MESSAGE_SELECT} WHERE m.id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest first, strictly older than `before` when given.
    pub async fn list(
        pool: &SqlitePool,
        room_id: Uuid,
        before: Option<Timestamp>,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(&format!(
            "{MESSAGE_SELECT}
             WHERE m.room_id = ? AND (? IS NULL OR m.created_at < ?)
             ORDER BY m.created_at DESC, m.rowid DESC
             LIMIT ?"
        ))
        .bind(room_id)
        .bind(before)
        .bind(before)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
