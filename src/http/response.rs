//! JSON response envelope.
//!
//! Every JSON body the API produces, success or failure, has the shape
//! `{ "success": bool, "data": ..., "message": ... }`. Absent fields are
//! omitted rather than serialized as `null`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 200 with `data`.
pub fn ok<T: Serialize>(data: T) -> ApiResponse<T> {
    ApiResponse::success(data)
}

/// 201 with `data`.
pub fn created<T: Serialize>(data: T) -> (StatusCode, ApiResponse<T>) {
    (StatusCode::CREATED, ApiResponse::success(data))
}

/// Error body with an explicit status.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, ApiResponse::error(message)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_omits_message() {
        let value = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(value, serde_json::json!({ "success": true, "data": [1, 2] }));
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let value = serde_json::to_value(ApiResponse::error("nope")).unwrap();
        assert_eq!(value, serde_json::json!({ "success": false, "message": "nope" }));
    }

    #[test]
    fn test_created_status() {
        let response = created("x").into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
