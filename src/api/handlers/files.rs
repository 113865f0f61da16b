use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{lookup_error, upload_error};
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::fingerprint;
use crate::storage::ObjectRecord;
use crate::uploader::extension_for;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub filename: String,
    pub id: String,
    pub is_duplicate: bool,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub extension: String,
    pub hash: String,
    pub id: String,
    pub mime_type: String,
    pub original_name: String,
    pub size: u64,
    pub uploaded_at: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large(state.config.max_upload_size)
        } else {
            ApiError::bad_request(format!("Invalid multipart data: {e}"))
        }
    })? {
        if field.name() != Some("file") {
            // Ignore unknown fields
            continue;
        }

        file_name = field.file_name().map(|s| s.to_string());

        let data = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                too_large(state.config.max_upload_size)
            } else {
                ApiError::bad_request(format!("Failed to read file: {e}"))
            }
        })?;

        if data.len() as u64 > state.config.max_upload_size {
            return Err(too_large(state.config.max_upload_size));
        }

        file_data = Some(data);
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let file_name = file_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "upload".to_string());

    let extension = extension_for(&file_name);
    if !state.config.extension_allowed(&extension) {
        return Err(ApiError::unsupported_media_type(format!(
            "Files with extension '{extension}' are not accepted"
        )));
    }

    let outcome = state
        .uploader
        .store(file_data, &file_name)
        .await
        .map_err(|e| upload_error(e, state.config.production))?;

    tracing::debug!(id = %outcome.id, duplicate = outcome.is_duplicate, "Upload complete");

    Ok(JSend::success(UploadResponse {
        filename: outcome.original_name,
        id: outcome.id,
        is_duplicate: outcome.is_duplicate,
        size: outcome.size,
        url: outcome.public_url,
    }))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let record = state
        .uploader
        .resolve(&id)
        .map_err(|e| lookup_error(e, state.config.production))?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    Ok(JSend::success(record_to_response(&record)))
}

/// Pre-upload dedup check. The hash is only a hint; uploads are always
/// fingerprinted again server-side.
pub async fn check_hash(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CheckRequest>,
) -> Result<Json<JSend<CheckResponse>>, ApiError> {
    check(&state, req.hash.as_deref())
}

pub async fn check_hash_query(
    State(state): State<Arc<AppState>>,
    AppQuery(req): AppQuery<CheckRequest>,
) -> Result<Json<JSend<CheckResponse>>, ApiError> {
    check(&state, req.hash.as_deref())
}

// ============================================================================
// Helpers
// ============================================================================

fn check(state: &AppState, hash: Option<&str>) -> Result<Json<JSend<CheckResponse>>, ApiError> {
    let hash = hash
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Hash is required"))?;
    let hash = fingerprint::normalize(hash)
        .ok_or_else(|| ApiError::bad_request("Hash must be a hex-encoded SHA-256 digest"))?;

    let record = match state
        .uploader
        .lookup_by_hash(&hash)
        .map_err(|e| lookup_error(e, state.config.production))?
    {
        Some(id) => state
            .uploader
            .resolve(&id)
            .map_err(|e| lookup_error(e, state.config.production))?,
        None => None,
    };

    Ok(JSend::success(match record {
        Some(record) => CheckResponse {
            exists: true,
            id: Some(record.id),
            original_name: Some(record.original_name),
            url: Some(record.public_url),
        },
        None => CheckResponse {
            exists: false,
            id: None,
            original_name: None,
            url: None,
        },
    }))
}

fn too_large(limit: u64) -> ApiError {
    ApiError::payload_too_large(format!(
        "File exceeds maximum upload size of {limit} bytes"
    ))
}

fn record_to_response(record: &ObjectRecord) -> FileResponse {
    FileResponse {
        extension: record.extension.clone(),
        hash: record.hash.clone(),
        id: record.id.clone(),
        mime_type: mime_guess::from_ext(record.extension.trim_start_matches('.'))
            .first_or_octet_stream()
            .to_string(),
        original_name: record.original_name.clone(),
        size: record.size,
        uploaded_at: record.uploaded_at.to_rfc3339(),
        url: record.public_url.clone(),
    }
}
