use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use super::lookup_error;
use crate::api::response::ApiError;
use crate::AppState;

/// Follow a short link to the stored bytes.
/// Route: GET /:filename where filename is `{id}.{ext}`
pub async fn follow_link(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let id = link_id(&filename).ok_or_else(|| ApiError::not_found("File not found"))?;

    let record = state
        .uploader
        .resolve(id)
        .map_err(|e| lookup_error(e, state.config.production))?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    tracing::debug!(%id, location = %record.download_location, "Redirecting");

    let mut response = StatusCode::FOUND.into_response();
    let location = header::HeaderValue::from_str(&record.download_location)
        .map_err(|_| ApiError::internal("Stored download location is not a valid URL"))?;
    response.headers_mut().insert(header::LOCATION, location);

    // Objects never change once stored
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("public, max-age=3600"),
    );

    Ok(response)
}

/// Identifier part of `{id}.{ext}`. `None` when there is no alphanumeric
/// extension.
fn link_id(filename: &str) -> Option<&str> {
    let (id, ext) = filename.split_once('.')?;
    let ext = ext.rsplit('.').next().unwrap_or(ext);
    if id.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_id() {
        assert_eq!(link_id("abc123.png"), Some("abc123"));
        assert_eq!(link_id("abc123.tar.gz"), Some("abc123"));
        assert_eq!(link_id("abc123"), None);
        assert_eq!(link_id(".png"), None);
        assert_eq!(link_id("abc123."), None);
        assert_eq!(link_id("abc123.p-g"), None);
    }
}
