//! Chat room routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::extract::{bounded_text, ApiJson, ApiPath, ApiQuery};
use crate::auth::AuthUser;
use crate::chat::ChatEvent;
use crate::db::chat::{ChatMember, ChatMessage, ChatRoom, MemberRole, RoomSummary};
use crate::db::users::User;
use crate::db::Timestamp;
use crate::error::ApiError;
use crate::http::response::{created, ok, ApiResponse};
use crate::http::server::AppState;
use crate::http::websocket::chat_socket;

const MAX_ROOM_NAME_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_HISTORY_LIMIT: i64 = 200;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{id}", get(get_room).delete(delete_room))
        .route("/rooms/{id}/join", post(join_room))
        .route("/rooms/{id}/members", post(add_member))
        .route("/rooms/{id}/members/me", delete(leave_room))
        .route("/rooms/{id}/messages", get(list_messages).post(post_message))
        .route("/rooms/{id}/ws", get(chat_socket))
        .route("/messages/{id}", delete(delete_message))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub is_member: bool,
    pub members: Vec<ChatMember>,
}

#[derive(Debug, Serialize)]
pub struct Membership {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub is_member: bool,
}

pub(crate) async fn load_room(state: &AppState, room_id: Uuid) -> Result<ChatRoom, ApiError> {
    ChatRoom::find(&state.db, room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("room not found"))
}

pub(crate) async fn require_member(state: &AppState, room_id: Uuid, user_id: Uuid) -> Result<MemberRole, ApiError> {
    ChatRoom::member_role(&state.db, room_id, user_id)
        .await?
        .ok_or_else(|| ApiError::forbidden("not a member of this room"))
}

/// Persist a message and broadcast it. Shared by the REST route and sockets.
pub(crate) async fn send_message(
    state: &AppState,
    room_id: Uuid,
    user: &AuthUser,
    content: &str,
) -> Result<ChatMessage, ApiError> {
    let content = bounded_text("content", content, state.config.chat.max_message_len)?;
    load_room(state, room_id).await?;
    require_member(state, room_id, user.id).await?;

    let message = ChatMessage::create(&state.db, room_id, user.id, content).await?;
    let receivers = state.chat.publish(
        room_id,
        ChatEvent::MessageCreated {
            message: message.clone(),
        },
    );
    tracing::debug!(room_id = %room_id, message_id = %message.id, receivers, "Chat message posted");
    Ok(message)
}

async fn list_rooms(State(state): State<AppState>, user: AuthUser) -> Result<ApiResponse<Vec<RoomSummary>>, ApiError> {
    Ok(ok(ChatRoom::list_visible(&state.db, user.id).await?))
}

async fn create_room(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateRoomRequest>,
) -> Result<(StatusCode, ApiResponse<RoomSummary>), ApiError> {
    let name = bounded_text("name", &req.name, MAX_ROOM_NAME_LEN)?;
    let description = req
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(ApiError::bad_request(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }

    let room = ChatRoom::create(&state.db, user.id, name, description, req.is_private).await?;
    tracing::info!(room_id = %room.id, owner = %user.id, private = room.is_private, "Chat room created");

    Ok(created(RoomSummary {
        room,
        member_count: 1,
        is_member: true,
    }))
}

async fn get_room(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<Uuid>,
) -> Result<ApiResponse<RoomDetail>, ApiError> {
    let room = load_room(&state, room_id).await?;
    let is_member = ChatRoom::member_role(&state.db, room_id, user.id).await?.is_some();
    if room.is_private && !is_member {
        return Err(ApiError::forbidden("not a member of this room"));
    }

    let members = ChatRoom::members(&state.db, room_id).await?;
    Ok(ok(RoomDetail { room, is_member, members }))
}

async fn join_room(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<Uuid>,
) -> Result<ApiResponse<Membership>, ApiError> {
    let room = load_room(&state, room_id).await?;
    if room.is_private {
        return Err(ApiError::forbidden("private rooms are invite-only"));
    }

    if ChatRoom::add_member(&state.db, room_id, user.id).await? {
        state.chat.publish(
            room_id,
            ChatEvent::MemberJoined {
                room_id,
                user_id: user.id,
                username: user.username.clone(),
            },
        );
    }

    Ok(ok(Membership {
        room_id,
        user_id: user.id,
        is_member: true,
    }))
}

async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> Result<ApiResponse<Membership>, ApiError> {
    load_room(&state, room_id).await?;
    if require_member(&state, room_id, user.id).await? != MemberRole::Owner {
        return Err(ApiError::forbidden("only the room owner can add members"));
    }

    let invitee = User::find_by_id(&state.db, req.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    if ChatRoom::add_member(&state.db, room_id, invitee.id).await? {
        state.chat.publish(
            room_id,
            ChatEvent::MemberJoined {
                room_id,
                user_id: invitee.id,
                username: invitee.username,
            },
        );
    }

    Ok(ok(Membership {
        room_id,
        user_id: invitee.id,
        is_member: true,
    }))
}

async fn leave_room(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    load_room(&state, room_id).await?;
    if require_member(&state, room_id, user.id).await? == MemberRole::Owner {
        return Err(ApiError::bad_request("the owner cannot leave; delete the room instead"));
    }

    ChatRoom::remove_member(&state.db, room_id, user.id).await?;
    state.chat.publish(
        room_id,
        ChatEvent::MemberLeft {
            room_id,
            user_id: user.id,
            username: user.username,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_room(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let room = load_room(&state, room_id).await?;
    if room.owner_id != user.id {
        return Err(ApiError::forbidden("only the room owner can delete it"));
    }

    ChatRoom::delete(&state.db, room_id).await?;
    state.chat.publish(room_id, ChatEvent::RoomDeleted { room_id });
    state.chat.close_room(room_id);

    tracing::info!(room_id = %room_id, "Chat room deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<ApiResponse<Vec<ChatMessage>>, ApiError> {
    load_room(&state, room_id).await?;
    require_member(&state, room_id, user.id).await?;

    let cap = state.config.chat.history_limit.clamp(1, MAX_HISTORY_LIMIT);
    let limit = query.limit.unwrap_or(cap).clamp(1, cap);
    let before = query.before.map(Timestamp::from);

    Ok(ok(ChatMessage::list(&state.db, room_id, before, limit).await?))
}

async fn post_message(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(room_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<(StatusCode, ApiResponse<ChatMessage>), ApiError> {
    let message = send_message(&state, room_id, &user, &req.content).await?;
    Ok(created(message))
}

async fn delete_message(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(message_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let message = ChatMessage::find(&state.db, message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("message not found"))?;
    let room = load_room(&state, message.room_id).await?;

    if message.user_id != user.id && room.owner_id != user.id {
        return Err(ApiError::forbidden("only the author or the room owner can delete this message"));
    }

    ChatMessage::delete(&state.db, message_id).await?;
    state.chat.publish(
        room.id,
        ChatEvent::MessageDeleted {
            room_id: room.id,
            message_id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}
