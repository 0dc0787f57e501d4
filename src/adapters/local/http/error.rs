use crate::adapters::local::download::DownloadError;
use crate::application::assembler::AssemblyError;
use crate::application::content::ContentError;
use crate::application::thumbnail::ThumbnailError;
use crate::application::transcoder::TranscodeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error response: `{"status": 0, "message": ...}` with a mapped status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "status": 0, "message": self.message })),
        )
            .into_response()
    }
}

impl From<AssemblyError> for ApiError {
    fn from(err: AssemblyError) -> Self {
        let status = match &err {
            AssemblyError::Validation(_) => StatusCode::BAD_REQUEST,
            AssemblyError::SizeMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AssemblyError::TimedOut(_) => StatusCode::REQUEST_TIMEOUT,
            AssemblyError::MissingFragments(_)
            | AssemblyError::Io { .. }
            | AssemblyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<TranscodeError> for ApiError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::Validation(_) => Self::bad_request(err.to_string()),
            TranscodeError::Playlist(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<ThumbnailError> for ApiError {
    fn from(err: ThumbnailError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        let status = match &err {
            DownloadError::InvalidName(_) => StatusCode::BAD_REQUEST,
            DownloadError::Request(_) => StatusCode::BAD_GATEWAY,
            DownloadError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        let status = match &err {
            ContentError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            ContentError::NotFound(_) => StatusCode::NOT_FOUND,
            ContentError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn assembly_errors_map_to_statuses() {
        let cases = [
            (AssemblyError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                AssemblyError::SizeMismatch {
                    expected: 2,
                    actual: 1,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AssemblyError::TimedOut(Duration::from_secs(1)),
                StatusCode::REQUEST_TIMEOUT,
            ),
            (
                AssemblyError::Internal("join".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn transcode_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(TranscodeError::Validation("x".into())).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(TranscodeError::Playlist("x".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(DownloadError::InvalidName("..".into())).status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn missing_content_is_not_found() {
        let err = ApiError::from(ContentError::NotFound("a.mp4".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
