use super::error::ApiError;
use super::range::{parse_range, ByteRange};
use super::AppState;
use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::path::Path;

const IMAGE_MAX_AGE: &str = "public, max-age=86400";
const VIDEO_MAX_AGE: &str = "public, max-age=604800";
const DEFAULT_MAX_AGE: &str = "public, max-age=3600";

/// Cache-Control value for a file, by extension class.
pub fn cache_control(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg" | "png" | "gif") => IMAGE_MAX_AGE,
        Some("mp4" | "mov" | "avi" | "webm") => VIDEO_MAX_AGE,
        _ => DEFAULT_MAX_AGE,
    }
}

/// Serves a file under the media root through the weighted cache.
pub async fn serve(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let content = state.content.fetch(&path).await?;
    let len = content.bytes.len() as u64;
    let mime = mime_guess::from_path(&path).first_or_octet_stream().to_string();

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    let (status, body, content_range) = match parse_range(range, len) {
        ByteRange::Full => (StatusCode::OK, content.bytes, None),
        ByteRange::Partial { start, end } => (
            StatusCode::PARTIAL_CONTENT,
            content.bytes.slice(start as usize..=end as usize),
            Some(format!("bytes {}-{}/{}", start, end, len)),
        ),
        ByteRange::Unsatisfiable => {
            return Ok((
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", len))],
            )
                .into_response());
        }
    };

    let mut response = (status, Body::from(body)).into_response();
    let response_headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&mime) {
        response_headers.insert(header::CONTENT_TYPE, value);
    }
    response_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control(&path)),
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(value) = content_range.and_then(|range| HeaderValue::from_str(&range).ok()) {
        response_headers.insert(header::CONTENT_RANGE, value);
    }
    Ok(response)
}
