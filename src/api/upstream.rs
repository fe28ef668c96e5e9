//! Pass-through to named upstream groups via the fallback client.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;

use crate::api::extract::ApiPath;
use crate::error::ApiError;
use crate::http::server::AppState;
use crate::upstream::{UpstreamError, UpstreamRequest};

pub const X_UPSTREAM_ENDPOINT: HeaderName = HeaderName::from_static("x-upstream-endpoint");
pub const X_UPSTREAM_CACHE: HeaderName = HeaderName::from_static("x-upstream-cache");

pub fn routes() -> Router<AppState> {
    Router::new().route("/{group}/{*path}", any(forward))
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// The request path after the group segment, exactly as the client encoded it.
fn encoded_tail(uri: &Uri) -> &str {
    uri.path()
        .trim_start_matches('/')
        .split_once('/')
        .map_or("", |(_, rest)| rest)
}

async fn forward(
    State(state): State<AppState>,
    ApiPath((group, path)): ApiPath<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let client = state.upstreams.get(&group)?;

    // `path` is decoded; `..` hidden behind percent-encoding must still be rejected.
    if path.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(UpstreamError::InvalidPath(path).into());
    }

    let mut path_and_query = format!("/{}", encoded_tail(&uri).trim_start_matches('/'));
    if let Some(query) = uri.query() {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    let request = UpstreamRequest {
        method,
        path_and_query,
        accept: header_string(&headers, ACCEPT),
        content_type: header_string(&headers, CONTENT_TYPE),
        body: (!body.is_empty()).then_some(body),
    };

    let upstream = client.execute(&request).await?;

    let mut response = (upstream.status, upstream.body).into_response();
    let out = response.headers_mut();
    if let Some(ct) = upstream.content_type.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
        out.insert(CONTENT_TYPE, ct);
    }
    if let Ok(endpoint) = HeaderValue::from_str(&upstream.endpoint) {
        out.insert(X_UPSTREAM_ENDPOINT, endpoint);
    }
    out.insert(
        X_UPSTREAM_CACHE,
        HeaderValue::from_static(if upstream.from_cache { "hit" } else { "miss" }),
    );
    Ok(response)
}
