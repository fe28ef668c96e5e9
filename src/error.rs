//! HTTP-facing error type.
//!
//! Handlers return `Result<_, ApiError>`. Subsystem errors convert into it
//! with `?`, and the `IntoResponse` impl picks the status code and renders
//! the [`ApiResponse`](crate::http::response::ApiResponse) envelope.
//! Internal details are logged, never sent to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::auth::password::PasswordError;
use crate::auth::token::TokenError;
use crate::http::response::error_response;
use crate::images::ImageCacheError;
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    GatewayTimeout(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Database(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

impl ApiError {
    /// Message safe to show a client. Internal details are logged instead.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Database(e) if is_unique_violation(e) => "resource already exists".to_string(),
            ApiError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                "internal server error".to_string()
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(self.status(), self.public_message())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::Unauthorized("token expired".to_string()),
            TokenError::Invalid => ApiError::Unauthorized("invalid token".to_string()),
            TokenError::Encoding(e) => ApiError::Internal(e),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match &err {
            UpstreamError::UnknownGroup(_) => ApiError::NotFound(err.to_string()),
            UpstreamError::InvalidPath(_) => ApiError::BadRequest(err.to_string()),
            UpstreamError::NoEndpoints { .. } => ApiError::BadGateway(err.to_string()),
            UpstreamError::Exhausted { .. } if err.all_timeouts() => {
                ApiError::GatewayTimeout(err.to_string())
            }
            UpstreamError::Exhausted { .. } => ApiError::BadGateway(err.to_string()),
        }
    }
}

impl From<ImageCacheError> for ApiError {
    fn from(err: ImageCacheError) -> Self {
        match err {
            ImageCacheError::Disabled => ApiError::NotFound(err.to_string()),
            ImageCacheError::InvalidUrl(_) | ImageCacheError::NotAnImage(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ImageCacheError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            ImageCacheError::Fetch(_) => ApiError::BadGateway(err.to_string()),
            ImageCacheError::Timeout => ApiError::GatewayTimeout(err.to_string()),
            ImageCacheError::Store(e) => ApiError::Internal(e.to_string()),
            ImageCacheError::Database(e) => ApiError::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::client::{AttemptFailure, FailureReason};

    fn exhausted(reasons: Vec<FailureReason>) -> UpstreamError {
        UpstreamError::Exhausted {
            group: "anime".to_string(),
            attempts: reasons
                .into_iter()
                .map(|reason| AttemptFailure {
                    endpoint: "http://a".to_string(),
                    round: 1,
                    reason,
                })
                .collect(),
        }
    }

    #[test]
    fn test_upstream_status_mapping() {
        let all_timeouts = exhausted(vec![FailureReason::Timeout, FailureReason::Timeout]);
        assert_eq!(ApiError::from(all_timeouts).status(), StatusCode::GATEWAY_TIMEOUT);

        let mixed = exhausted(vec![FailureReason::Timeout, FailureReason::Status { code: 503 }]);
        assert_eq!(ApiError::from(mixed).status(), StatusCode::BAD_GATEWAY);

        let unknown = UpstreamError::UnknownGroup("nope".to_string());
        assert_eq!(ApiError::from(unknown).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_image_status_mapping() {
        assert_eq!(
            ApiError::from(ImageCacheError::TooLarge { limit: 10 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(ImageCacheError::NotAnImage("text/html".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(ImageCacheError::Disabled).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_token_errors_are_unauthorized() {
        assert_eq!(ApiError::from(TokenError::Expired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(TokenError::Invalid).status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let response = ApiError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
