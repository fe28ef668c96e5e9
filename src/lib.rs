//! Portal backend library: accounts, chat, social feed, image re-hosting
//! and a fallback client for flaky third-party APIs.

pub mod admin;
pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod http;
pub mod images;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod upstream;

pub use config::schema::PortalConfig;
pub use error::ApiError;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
