//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! register/login → password.rs (Argon2id) → token.rs (HS256 JWT)
//! request → extractor.rs (Authorization: Bearer) → token.rs verify → AuthUser
//! ```
//!
//! # Design Decisions
//! - Tokens are stateless; nothing is stored server-side
//! - Login failures use a single message for unknown user and wrong password

pub mod extractor;
pub mod password;
pub mod token;
pub mod validate;

pub use extractor::AuthUser;
pub use token::{Claims, IssuedToken, TokenError, TokenService};
