use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    /// Base for public links, e.g. `https://files.example.com`. No trailing slash.
    pub public_base_url: String,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// Lower-cased extensions with leading dot. Empty allows everything.
    pub allowed_extensions: Vec<String>,
    /// Production hides error details from clients.
    pub production: bool,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Json,
    Redb,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub format: CatalogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    GitHub,
    Local,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub branch: String,
    pub owner: String,
    pub repo: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Folder inside the backend that receives every object
    pub folder: String,
    /// Directory for local storage backend
    pub local_storage_path: String,
    pub github: GitHubConfig,
    /// Upper bound on a single backend write
    pub backend_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            format: CatalogFormat::Redb,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            branch: "main".to_string(),
            owner: String::new(),
            repo: "media".to_string(),
            token: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            folder: "media".to_string(),
            local_storage_path: "./files".to_string(),
            github: GitHubConfig::default(),
            backend_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let catalog_format = match std::env::var("CATALOG_FORMAT")
            .unwrap_or_else(|_| "redb".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => CatalogFormat::Json,
            _ => CatalogFormat::Redb,
        };

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "github" => StorageBackend::GitHub,
            _ => StorageBackend::Local,
        };

        let defaults = GitHubConfig::default();
        let github = GitHubConfig {
            api_url: std::env::var("GITHUB_API_URL").unwrap_or(defaults.api_url),
            branch: std::env::var("BRANCH").unwrap_or(defaults.branch),
            owner: std::env::var("GITHUB_USERNAME").unwrap_or_default(),
            repo: std::env::var("REPO_NAME").unwrap_or(defaults.repo),
            token: std::env::var("GITHUB_TOKEN").unwrap_or_default(),
        };

        let folder = std::env::var("FOLDER_NAME").unwrap_or_else(|_| "media".to_string());

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());

        let backend_timeout = std::env::var("BACKEND_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let public_base_url = std::env::var("DOMAIN")
            .unwrap_or_else(|_| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20 * 1024 * 1024); // 20MB

        let allowed_extensions = std::env::var("ALLOWED_EXTENSIONS")
            .map(|s| parse_extensions(&s))
            .unwrap_or_default();

        let production = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            catalog: CatalogConfig {
                format: catalog_format,
            },
            storage: StorageConfig {
                backend: storage_backend,
                folder,
                local_storage_path,
                github,
                backend_timeout,
            },
            public_base_url,
            max_upload_size,
            allowed_extensions,
            production,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.public_base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "DOMAIN cannot be empty".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::GitHub {
            if self.storage.github.token.is_empty() {
                return Err(ConfigError::ValidationError(
                    "GITHUB_TOKEN is required when STORAGE_BACKEND=github".to_string(),
                ));
            }
            if self.storage.github.owner.is_empty() {
                return Err(ConfigError::ValidationError(
                    "GITHUB_USERNAME is required when STORAGE_BACKEND=github".to_string(),
                ));
            }
        }

        if self.storage.backend_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "BACKEND_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_upload_size == 0 {
            tracing::warn!("MAX_UPLOAD_SIZE is 0, every upload will be rejected");
        }

        Ok(())
    }

    /// Whether an extension (lower-cased, with dot) may be uploaded.
    pub fn extension_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions.is_empty() || self.allowed_extensions.iter().any(|e| e == extension)
    }
}

/// Parse `png, .JPG,,gif` into `[".png", ".jpg", ".gif"]`.
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| format!(".{s}"))
        .collect()
}
