use super::error::ApiError;
use super::{api_key, AppState};
use crate::application::assembler::{Fragment, FragmentStatus};
use crate::application::transcoder::public_url;
use crate::domain::upload::AssembledFile;
use crate::ports::uploads::NewUpload;
use axum::body::Bytes;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    pub file_id: String,
    pub curr_chunk: u32,
    pub total_chunks: u32,
    pub file_name: String,
    pub ext: String,
    pub total_size: u64,
    #[serde(default)]
    pub remote: bool,
}

/// Receives one fragment as the multipart field `file`.
pub async fn upload_fragment(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut data: Option<Bytes> = None;
    let mut form_key: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(e.to_string()))?,
                )
            }
            Some("apiKey") => {
                form_key = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(e.to_string()))?,
                )
            }
            _ => continue,
        }
    }
    let data = data.ok_or_else(|| ApiError::bad_request("missing file field"))?;

    let fragment = Fragment {
        upload_id: query.file_id,
        index: query.curr_chunk,
        total_chunks: query.total_chunks,
        file_name: query.file_name,
        extension: query.ext,
        total_size: query.total_size,
        data,
    };

    let status = state
        .assembler
        .receive_within(fragment, state.settings.upload_timeout)
        .await?;

    match status {
        FragmentStatus::Partial { percent, .. } => {
            Ok((StatusCode::PARTIAL_CONTENT, percent.to_string()).into_response())
        }
        FragmentStatus::AlreadyComplete => {
            Ok((StatusCode::OK, "upload already complete").into_response())
        }
        FragmentStatus::Complete(file) => {
            let url = public_url(
                &state.settings.public_base_url,
                &state.settings.media_root,
                &file.path,
            );
            if query.remote {
                let key = form_key.or_else(|| api_key(&headers)).unwrap_or_default();
                publish_upload(&state, &key, &file, &url).await?;
            }
            info!(upload_id = %file.upload_id, url, "upload created");
            Ok((
                StatusCode::CREATED,
                Json(json!({ "url": url, "size": file.size })),
            )
                .into_response())
        }
    }
}

async fn publish_upload(
    state: &AppState,
    api_key: &str,
    file: &AssembledFile,
    url: &str,
) -> Result<(), ApiError> {
    let owner = state
        .identities
        .resolve(api_key)
        .await
        .map_err(|e| {
            error!(error = %e, "api key lookup failed");
            ApiError::internal("failed to resolve api key")
        })?
        .ok_or_else(|| ApiError::internal("unknown api key"))?;

    let record = NewUpload {
        url: url.to_string(),
        file_type: file.extension.clone(),
        size: file.size,
        application_id: owner.application_id,
        user_id: owner.user_id,
    };
    state.publisher.publish(&record).await.map_err(|e| {
        error!(upload_id = %file.upload_id, error = %e, "failed to publish upload");
        ApiError::internal("failed to publish upload")
    })
}
