//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → request.rs (request ID, span, request metrics)
//!     → server.rs (middleware stack, router, AppState)
//!     → api/* handlers or websocket.rs (chat sockets)
//!     → response.rs (JSON envelope)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::X_REQUEST_ID;
pub use response::ApiResponse;
pub use server::{AppState, HttpServer};
