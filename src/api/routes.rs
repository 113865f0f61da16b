use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

// Room for multipart boundaries and part headers around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        // Uploads
        .route(
            "/api/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Lookups
        .route(
            "/api/check",
            get(handlers::check_hash_query).post(handlers::check_hash),
        )
        .route("/api/files/:id", get(handlers::get_file))
        .route("/api/stats", get(handlers::stats))
        // Internal
        .route("/_internal/health", get(handlers::health))
        // Short links
        .route("/:filename", get(handlers::follow_link))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
