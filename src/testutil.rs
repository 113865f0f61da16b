//! Shared test helpers for shortlink-store unit tests.

use std::sync::Arc;

use chrono::Utc;

use crate::config::{CatalogConfig, Config, NodeConfig, StorageConfig};
use crate::object_store::LocalStore;
use crate::storage::{Database, ObjectRecord};
use crate::uploader::Uploader;
use crate::AppState;

/// A record with the given id and hash and plausible everything else.
pub fn sample_record(id: &str, hash: &str) -> ObjectRecord {
    ObjectRecord {
        id: id.to_string(),
        original_name: format!("{id}.png"),
        extension: ".png".to_string(),
        size: 1024,
        hash: hash.to_string(),
        backend_path: format!("media/{id}.png"),
        backend_ref: format!("https://example.test/view/{id}.png"),
        download_location: format!("https://example.test/raw/{id}.png"),
        uploaded_at: Utc::now(),
        public_url: format!("http://links.test/{id}.png"),
    }
}

/// Configuration rooted in `temp_dir`, local backend, no size surprises.
pub fn test_config(temp_dir: &tempfile::TempDir) -> Config {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        catalog: CatalogConfig::default(),
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            ..Default::default()
        },
        public_base_url: "http://links.test".to_string(),
        max_upload_size: 1024 * 1024, // 1MB for tests
        allowed_extensions: Vec::new(),
        production: false,
    }
}

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    state_with_config(test_config(temp_dir))
}

pub fn state_with_config(config: Config) -> Arc<AppState> {
    let db = Database::open(&config.node.data_dir).expect("Failed to open test database");
    let object_store = LocalStore::new(&config.storage.local_storage_path)
        .expect("Failed to create test object store");
    let uploader = Uploader::new(Arc::new(db), Arc::new(object_store), &config);

    Arc::new(AppState {
        config,
        uploader: Arc::new(uploader),
    })
}

/// Serve the router on an ephemeral port and return its base URL.
pub async fn spawn_app(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    let app = crate::api::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });
    format!("http://{addr}")
}

/// HTTP client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build test client")
}

/// Hand-rolled `multipart/form-data` body with a single `file` part.
/// Returns the content type and the body.
pub fn multipart_body(file_name: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "shortlink-test-boundary-7f3a";
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
