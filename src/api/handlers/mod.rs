mod admin;
mod files;
mod static_files;

use crate::api::response::ApiError;
use crate::uploader::UploadError;

pub use admin::{health, stats};
pub use files::{check_hash, check_hash_query, get_file, upload_file};
pub use static_files::follow_link;

/// Map an UploadError to an ApiError. Details are attached only outside
/// production.
fn upload_error(e: UploadError, production: bool) -> ApiError {
    tracing::error!(error = %e, "Request failed");

    let details = (!production).then(|| format!("{e:?}"));
    let api_error = match e {
        UploadError::Backend(_) => ApiError::bad_gateway("Upload failed: storage backend error"),
        UploadError::Catalog(ref db) if db.is_corrupt() => {
            ApiError::internal("Upload failed: catalog is unreadable")
        }
        _ => ApiError::internal("Upload failed"),
    };
    api_error.with_details(details)
}

/// Lookup failures hide everything but the fact that they failed.
fn lookup_error(e: UploadError, production: bool) -> ApiError {
    tracing::error!(error = %e, "Lookup failed");
    ApiError::internal("Lookup failed").with_details((!production).then(|| format!("{e:?}")))
}
