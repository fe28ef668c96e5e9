//! Public REST surface.
//!
//! ```text
//! /health, /ready
//! /api/auth/...      accounts and tokens
//! /api/chat/...      rooms, members, messages, websocket
//! /api/posts/...     feed, comments, likes
//! /api/images/...    CDN re-hosting
//! /api/upstream/...  fallback pass-through
//! ```

pub mod auth;
pub mod chat;
pub mod extract;
pub mod health;
pub mod images;
pub mod social;
pub mod upstream;

use axum::Router;

use crate::http::server::AppState;

pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .nest("/auth", auth::routes())
        .nest("/chat", chat::routes())
        .nest("/images", images::routes())
        .nest("/upstream", upstream::routes())
        .merge(social::routes());

    Router::new().merge(health::routes()).nest("/api", api)
}
