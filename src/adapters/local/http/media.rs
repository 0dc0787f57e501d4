use super::error::ApiError;
use super::{api_key, AppState};
use crate::application::transcoder::{public_url, PlaylistRequest, TranscodeRequest};
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{BoxError, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::{Stream, TryStreamExt};
use serde::Deserialize;
use serde_json::json;
use std::io;
use std::path::Path;
use tokio::{fs::File, io::BufWriter};
use tokio_util::io::StreamReader;
use tracing::warn;
use uuid::Uuid;

/// Runs a transcode to completion and reports the aggregate status.
pub async fn transcode(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TranscodeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(mut request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if let Some(key) = api_key(&headers) {
        request.identity = key;
    }

    let report = state.transcoder.transcode(request).await?;
    let code = if report.status == 1 {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((code, Json(report)).into_response())
}

/// Segments one resolution of an existing file into a playlist.
pub async fn playlist(
    State(state): State<AppState>,
    body: Result<Json<PlaylistRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let report = state.transcoder.write_playlist(request).await?;
    Ok((StatusCode::CREATED, Json(report)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    pub file_name: String,
}

/// Fetches a remote file into the media root; the answer's `inputPath` can
/// be passed straight to `/transcode`.
pub async fn download(
    State(state): State<AppState>,
    body: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let downloaded = state
        .downloader
        .download(&request.url, &request.file_name)
        .await?;
    let url = public_url(
        &state.settings.public_base_url,
        &state.settings.media_root,
        &downloaded.path,
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "inputPath": request.file_name,
            "url": url,
            "size": downloaded.size,
        })),
    )
        .into_response())
}

/// Accepts a raw upload as the multipart field `file` and answers with one
/// frame of it, base64 encoded.
pub async fn thumbnail(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let extension = field
            .file_name()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin")
            .to_string();

        tokio::fs::create_dir_all(&state.settings.scratch_dir)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        let path = state
            .settings
            .scratch_dir
            .join(format!("thumb-{}.{}", Uuid::new_v4(), extension));
        if let Err(e) = stream_to_file(&path, field).await {
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %cleanup, "failed to remove partial upload");
            }
            return Err(e);
        }

        // The service removes the scratch file on every outcome.
        let frame = match state.thumbnails.extract(&path).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "thumbnail extraction failed");
                return Err(e.into());
            }
        };
        return Ok((
            StatusCode::CREATED,
            [(header::CONTENT_TYPE, "image/jpeg")],
            STANDARD.encode(frame),
        )
            .into_response());
    }
    Err(ApiError::bad_request("missing file field"))
}

// Save a `Stream` to a file
async fn stream_to_file<S, E>(path: &Path, stream: S) -> Result<(), ApiError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    async {
        let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let body_reader = StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        let mut file = BufWriter::new(File::create(path).await?);
        tokio::io::copy(&mut body_reader, &mut file).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        Ok::<_, io::Error>(())
    }
    .await
    .map_err(|err| ApiError::internal(err.to_string()))
}
