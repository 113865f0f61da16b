//! shortlink-store - content-addressed uploads behind short links
//!
//! This crate provides upload, deduplication and short-link resolution with:
//! - SHA-256 fingerprints as the sole identity of stored content
//! - Six-character identifiers allocated against the catalog
//! - Swappable blob backends (GitHub contents API, local filesystem)
//! - A catalog in redb or a single JSON document, written with compare-and-swap
//! - REST API with multipart upload support

pub mod api;
pub mod config;
pub mod fingerprint;
pub mod ident;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod uploader;

use std::sync::Arc;

use config::Config;
use uploader::Uploader;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub uploader: Arc<Uploader>,
}
