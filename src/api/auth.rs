//! Account routes: register, login, profile, token refresh, password change.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::api::extract::ApiJson;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::validate::{validate_email, validate_password, validate_username};
use crate::auth::AuthUser;
use crate::db::users::{NewUser, User};
use crate::error::ApiError;
use crate::http::response::{created, ok, ApiResponse};
use crate::http::server::AppState;

const MAX_DISPLAY_NAME_LEN: usize = 64;
const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Verified against on unknown identifiers so both login failures cost one Argon2 check.
static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/refresh", post(refresh))
        .route("/password", put(change_password))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

// Argon2 is deliberately slow; keep it off the async workers.
async fn hash_blocking(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn verify_blocking(password: String, phc: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &phc))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn dummy_hash() -> Result<&'static str, ApiError> {
    DUMMY_HASH
        .get_or_try_init(|| hash_blocking("unknown-account-placeholder".to_string()))
        .await
        .map(String::as_str)
}

fn issue(state: &AppState, user: User) -> Result<AuthResponse, ApiError> {
    let issued = state.tokens.issue(user.id, &user.username)?;
    Ok(AuthResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user,
    })
}

async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, ApiResponse<AuthResponse>), ApiError> {
    let username = req.username.trim();
    let email = req.email.trim();
    validate_username(username).map_err(ApiError::BadRequest)?;
    validate_email(email).map_err(ApiError::BadRequest)?;
    validate_password(&req.password, state.config.auth.min_password_len).map_err(ApiError::BadRequest)?;

    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if display_name.is_some_and(|name| name.chars().count() > MAX_DISPLAY_NAME_LEN) {
        return Err(ApiError::bad_request(format!(
            "display_name must be at most {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }

    match User::taken(&state.db, username, email).await? {
        (true, _) => return Err(ApiError::Conflict("username already taken".to_string())),
        (_, true) => return Err(ApiError::Conflict("email already registered".to_string())),
        _ => {}
    }

    let password_hash = hash_blocking(req.password.clone()).await?;
    let user = User::create(
        &state.db,
        NewUser {
            username,
            email,
            display_name,
            password_hash: &password_hash,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");
    Ok(created(issue(&state, user)?))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<ApiResponse<AuthResponse>, ApiError> {
    let Some(user) = User::find_by_identifier(&state.db, req.identifier.trim()).await? else {
        verify_blocking(req.password, dummy_hash().await?.to_string()).await?;
        tracing::debug!("Login failed: unknown identifier");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    if !verify_blocking(req.password, user.password_hash.clone()).await? {
        tracing::debug!(user_id = %user.id, "Login failed: wrong password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(ok(issue(&state, user)?))
}

async fn current_user(state: &AppState, auth: &AuthUser) -> Result<User, ApiError> {
    User::find_by_id(&state.db, auth.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("account no longer exists"))
}

async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<ApiResponse<User>, ApiError> {
    Ok(ok(current_user(&state, &auth).await?))
}

async fn refresh(State(state): State<AppState>, auth: AuthUser) -> Result<ApiResponse<AuthResponse>, ApiError> {
    let user = current_user(&state, &auth).await?;
    Ok(ok(issue(&state, user)?))
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validate_password(&req.new_password, state.config.auth.min_password_len).map_err(ApiError::BadRequest)?;

    let user = current_user(&state, &auth).await?;
    if !verify_blocking(req.current_password, user.password_hash).await? {
        return Err(ApiError::unauthorized("current password is incorrect"));
    }

    let password_hash = hash_blocking(req.new_password).await?;
    User::update_password(&state.db, user.id, &password_hash).await?;

    tracing::info!(user_id = %user.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}
