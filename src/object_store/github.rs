use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ObjectStore, ObjectStoreError, StoredObject};
use crate::config::GitHubConfig;

/// Object store on top of the GitHub repository contents API.
///
/// Each object becomes a commit on the configured branch.
pub struct GitHubStore {
    branch: String,
    client: Client,
    contents_url: String,
    token: String,
}

#[derive(Serialize)]
struct PutContentRequest<'a> {
    branch: &'a str,
    content: String,
    message: &'a str,
}

#[derive(Deserialize)]
struct PutContentResponse {
    content: ContentInfo,
}

#[derive(Deserialize)]
struct ContentInfo {
    path: String,
    html_url: Option<String>,
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

impl GitHubStore {
    pub fn new(config: &GitHubConfig, timeout: Duration) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("shortlink-store/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            branch: config.branch.clone(),
            client,
            contents_url: format!(
                "{}/repos/{}/{}/contents",
                config.api_url.trim_end_matches('/'),
                config.owner,
                config.repo
            ),
            token: config.token.clone(),
        })
    }

    fn content_url(&self, path: &str) -> String {
        format!("{}/{}", self.contents_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for GitHubStore {
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        commit_message: &str,
    ) -> Result<StoredObject, ObjectStoreError> {
        let body = PutContentRequest {
            branch: &self.branch,
            content: base64::engine::general_purpose::STANDARD.encode(&data),
            message: commit_message,
        };

        let resp = self
            .client
            .put(self.content_url(path))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ObjectStoreError::Unreachable(format!("request timed out: {e}"))
                } else {
                    ObjectStoreError::Unreachable(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorPayload>(&body)
                .map(|p| p.message)
                .unwrap_or(body);
            tracing::warn!(%path, status = status.as_u16(), %message, "GitHub rejected upload");
            return Err(ObjectStoreError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: PutContentResponse = resp
            .json()
            .await
            .map_err(|e| ObjectStoreError::InvalidResponse(e.to_string()))?;

        let download_location = parsed.content.download_url.ok_or_else(|| {
            ObjectStoreError::InvalidResponse("response has no download_url".to_string())
        })?;

        Ok(StoredObject {
            view_ref: parsed
                .content
                .html_url
                .unwrap_or_else(|| download_location.clone()),
            stored_path: parsed.content.path,
            download_location,
        })
    }
}
