//! Posts, comments and likes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::extract::{bounded_text, double_option, ApiJson, ApiPath, ApiQuery};
use crate::auth::AuthUser;
use crate::db::social::{Comment, Post, PostChanges, PostView};
use crate::db::users::User;
use crate::db::Timestamp;
use crate::error::ApiError;
use crate::http::response::{created, ok, ApiResponse};
use crate::http::server::AppState;

const MAX_PAGE_SIZE: i64 = 100;
const MAX_IMAGE_URL_LEN: usize = 2048;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post).patch(update_post).delete(delete_post))
        .route("/posts/{id}/comments", get(list_comments).post(create_comment))
        .route("/posts/{id}/like", post(like_post).delete(unlike_post))
        .route("/comments/{id}", delete(delete_comment))
        .route("/users/{username}/posts", get(user_posts))
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    #[serde(default)]
    pub content: Option<String>,
    /// `null` clears the image.
    #[serde(default, deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct LikeState {
    pub post_id: Uuid,
    pub liked: bool,
    pub like_count: i64,
}

fn page_limit(state: &AppState, requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(state.config.social.page_size)
        .clamp(1, MAX_PAGE_SIZE)
}

/// Only absolute http(s) URLs may be attached to a post.
fn check_image_url(raw: &str) -> Result<&str, ApiError> {
    let trimmed = raw.trim();
    if trimmed.len() > MAX_IMAGE_URL_LEN {
        return Err(ApiError::bad_request("image_url is too long"));
    }
    match url::Url::parse(trimmed) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => Ok(trimmed),
        _ => Err(ApiError::bad_request("image_url must be an absolute http(s) URL")),
    }
}

async fn load_post(state: &AppState, post_id: Uuid) -> Result<Post, ApiError> {
    Post::find(&state.db, post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("post not found"))
}

async fn load_view(state: &AppState, post_id: Uuid, viewer: Option<Uuid>) -> Result<PostView, ApiError> {
    PostView::find(&state.db, post_id, viewer)
        .await?
        .ok_or_else(|| ApiError::not_found("post not found"))
}

async fn list_posts(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> Result<ApiResponse<Vec<PostView>>, ApiError> {
    let limit = page_limit(&state, query.limit);
    let posts = PostView::page(
        &state.db,
        viewer.map(|v| v.id),
        None,
        query.before.map(Timestamp::from),
        limit,
    )
    .await?;
    Ok(ok(posts))
}

async fn user_posts(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    ApiPath(username): ApiPath<String>,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> Result<ApiResponse<Vec<PostView>>, ApiError> {
    let author = User::find_by_username(&state.db, &username)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let limit = page_limit(&state, query.limit);
    let posts = PostView::page(
        &state.db,
        viewer.map(|v| v.id),
        Some(author.id),
        query.before.map(Timestamp::from),
        limit,
    )
    .await?;
    Ok(ok(posts))
}

async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreatePostRequest>,
) -> Result<(StatusCode, ApiResponse<PostView>), ApiError> {
    let content = bounded_text("content", &req.content, state.config.social.max_post_len)?;
    let image_url = req
        .image_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .map(check_image_url)
        .transpose()?;

    let post = Post::create(&state.db, user.id, content, image_url).await?;
    tracing::info!(post_id = %post.id, user_id = %user.id, "Post created");

    Ok(created(load_view(&state, post.id, Some(user.id)).await?))
}

async fn get_post(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<ApiResponse<PostView>, ApiError> {
    Ok(ok(load_view(&state, post_id, viewer.map(|v| v.id)).await?))
}

async fn update_post(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdatePostRequest>,
) -> Result<ApiResponse<PostView>, ApiError> {
    if req.content.is_none() && req.image_url.is_none() {
        return Err(ApiError::bad_request("nothing to update"));
    }

    let post = load_post(&state, post_id).await?;
    if post.user_id != user.id {
        return Err(ApiError::forbidden("only the author can edit this post"));
    }

    let content = req
        .content
        .as_deref()
        .map(|c| bounded_text("content", c, state.config.social.max_post_len))
        .transpose()?;
    let image_url = match req.image_url.as_ref() {
        None => None,
        Some(None) => Some(None),
        Some(Some(raw)) if raw.trim().is_empty() => Some(None),
        Some(Some(raw)) => Some(Some(check_image_url(raw)?)),
    };

    Post::update(&state.db, post_id, PostChanges { content, image_url }).await?;
    Ok(ok(load_view(&state, post_id, Some(user.id)).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let post = load_post(&state, post_id).await?;
    if post.user_id != user.id {
        return Err(ApiError::forbidden("only the author can delete this post"));
    }

    Post::delete(&state.db, post_id).await?;
    tracing::info!(post_id = %post_id, "Post deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_comments(
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<ApiResponse<Vec<Comment>>, ApiError> {
    load_post(&state, post_id).await?;
    Ok(ok(Comment::list_for_post(&state.db, post_id).await?))
}

async fn create_comment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> Result<(StatusCode, ApiResponse<Comment>), ApiError> {
    let content = bounded_text("content", &req.content, state.config.social.max_comment_len)?;
    load_post(&state, post_id).await?;

    let comment = Comment::create(&state.db, post_id, user.id, content).await?;
    Ok(created(comment))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(comment_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let comment = Comment::find(&state.db, comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("comment not found"))?;

    // The post author moderates the thread.
    if comment.user_id != user.id {
        let post = load_post(&state, comment.post_id).await?;
        if post.user_id != user.id {
            return Err(ApiError::forbidden("only the author can delete this comment"));
        }
    }

    Comment::delete(&state.db, comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_post(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<ApiResponse<LikeState>, ApiError> {
    load_post(&state, post_id).await?;
    let like_count = Post::like(&state.db, post_id, user.id).await?;
    Ok(ok(LikeState {
        post_id,
        liked: true,
        like_count,
    }))
}

async fn unlike_post(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<ApiResponse<LikeState>, ApiError> {
    load_post(&state, post_id).await?;
    let like_count = Post::unlike(&state.db, post_id, user.id).await?;
    Ok(ok(LikeState {
        post_id,
        liked: false,
        like_count,
    }))
}
