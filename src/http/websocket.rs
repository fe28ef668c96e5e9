//! Live chat over WebSocket.
//!
//! # Responsibilities
//! - Authenticate and check room membership before the upgrade
//! - Cap concurrent sockets per user
//! - Forward room events to the client as JSON text frames
//! - Accept `{"type":"send","content":...}` frames from the client
//!
//! # Data Flow
//! ```text
//! Client ──── send frame ────→ send_message → DB → ChatHub::publish
//!                                                        │
//! Client ←── JSON events ──── broadcast::Receiver ←──────┘
//! ```
//!
//! # Design Decisions
//! - Browsers cannot set headers on upgrade, so `?token=` is accepted too
//! - A slow client that lags the broadcast buffer skips events instead of
//!   stalling the room
//! - The session ends when the room is deleted or the user leaves it

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::api::chat::{load_room, require_member, send_message};
use crate::api::extract::{ApiPath, ApiQuery};
use crate::auth::extractor::bearer_token;
use crate::auth::AuthUser;
use crate::chat::{ChatEvent, ClientCommand};
use crate::error::ApiError;
use crate::http::server::AppState;
use crate::security::ConnectionGuard;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename = "error")]
struct ErrorFrame {
    message: String,
}

pub async fn chat_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<WsParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = params
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| ApiError::unauthorized("missing token"))?;
    let user = AuthUser::from_token(&state, token)?;

    load_room(&state, room_id).await?;
    require_member(&state, room_id, user.id).await?;

    let guard = state
        .ws_connections
        .try_acquire(user.id)
        .ok_or_else(|| ApiError::TooManyRequests("too many open chat connections".to_string()))?;

    // Subscribe before the handshake so nothing published meanwhile is missed.
    let events = state.chat.subscribe(room_id);

    Ok(ws.on_upgrade(move |socket| run_session(socket, state, room_id, user, guard, events)))
}

/// Whether `event` ends the session of `user`.
fn ends_session(event: &ChatEvent, user: Uuid) -> bool {
    match event {
        ChatEvent::RoomDeleted { .. } => true,
        ChatEvent::MemberLeft { user_id, .. } => *user_id == user,
        _ => false,
    }
}

async fn send_json<T: Serialize>(sink: &mut SplitSink<WebSocket, Message>, value: &T) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(text) => sink.send(Message::Text(text.into())).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize chat frame");
            Ok(())
        }
    }
}

async fn handle_frame(state: &AppState, room_id: Uuid, user: &AuthUser, text: &str) -> Result<(), ErrorFrame> {
    let command: ClientCommand = serde_json::from_str(text).map_err(|e| ErrorFrame {
        message: format!("invalid frame: {}", e),
    })?;

    match command {
        ClientCommand::Send { content } => send_message(state, room_id, user, &content)
            .await
            .map(|_| ())
            .map_err(|e| ErrorFrame {
                message: e.public_message(),
            }),
    }
}

async fn run_session(
    socket: WebSocket,
    state: AppState,
    room_id: Uuid,
    user: AuthUser,
    _guard: ConnectionGuard,
    mut events: broadcast::Receiver<ChatEvent>,
) {
    let (mut sink, mut stream) = socket.split();

    tracing::info!(room_id = %room_id, user_id = %user.id, "Chat socket opened");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let last = ends_session(&event, user.id);
                    if send_json(&mut sink, &event).await.is_err() {
                        break;
                    }
                    if last {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(room_id = %room_id, user_id = %user.id, skipped, "Chat socket lagged");
                }
                Err(RecvError::Closed) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(reply) = handle_frame(&state, room_id, &user, text.as_str()).await {
                        if send_json(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Pings are answered by axum; binary frames are ignored.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Chat socket error");
                    break;
                }
            },
        }
    }

    state.chat.release(room_id, events);
    tracing::info!(room_id = %room_id, user_id = %user.id, "Chat socket closed");
}
