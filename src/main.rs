use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shortlink_store::{
    api,
    config::{CatalogFormat, Config, StorageBackend},
    object_store as obj,
    storage::{self, CatalogStore},
    uploader::Uploader,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "shortlink-store starting");

    // Load configuration
    let config = Config::load()?;

    // Open the catalog and fail fast if it is unreadable
    let catalog: Arc<dyn CatalogStore> = match config.catalog.format {
        CatalogFormat::Redb => Arc::new(storage::Database::open(&config.node.data_dir)?),
        CatalogFormat::Json => Arc::new(storage::JsonCatalog::open(&config.node.data_dir)?),
    };
    let snapshot = catalog.load()?;
    info!(
        data_dir = %config.node.data_dir,
        format = ?config.catalog.format,
        objects = snapshot.objects.len(),
        "Catalog loaded"
    );

    // Initialize object store backend
    let object_store: Arc<dyn obj::ObjectStore> = match config.storage.backend {
        StorageBackend::Local => {
            let store = obj::LocalStore::new(&config.storage.local_storage_path)?;
            info!(
                "Using local storage backend at: {}",
                config.storage.local_storage_path
            );
            Arc::new(store)
        }
        StorageBackend::GitHub => {
            let github = &config.storage.github;
            let store = obj::GitHubStore::new(github, config.storage.backend_timeout)?;
            info!(
                "Using GitHub storage backend: {}/{} ({})",
                github.owner, github.repo, github.branch
            );
            Arc::new(store)
        }
    };

    let uploader = Arc::new(Uploader::new(catalog, object_store, &config));

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        uploader,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
    info!("Listening on: {}", config.node.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
