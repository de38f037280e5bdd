//! Client for a remote git service exposing `/git/status`, `/git/stash`
//! and `/git/stash-pop`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{GitStatus, VersionControl};
use crate::error::VcsError;

#[derive(Deserialize)]
struct StashResponse {
    #[serde(default)]
    stashed: bool,
}

#[derive(Deserialize)]
struct PopResponse {
    #[serde(default)]
    popped: bool,
}

/// The service reports trimmed porcelain lines (`M src/lib.rs`); keep the path.
fn status_line_path(line: &str) -> String {
    let line = line.trim();
    let path = match line.split_once(' ') {
        Some((code, rest))
            if code.len() <= 2 && code.chars().all(|c| "MADRCUT?!".contains(c)) =>
        {
            rest.trim_start()
        }
        _ => line,
    };
    path.rsplit_once(" -> ").map_or(path, |(_, to)| to).to_string()
}

/// Versioning collaborator reached over HTTP.
pub struct HttpGitService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGitService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, VcsError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VcsError::Unreachable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, VcsError> {
        let response = request.send().await.map_err(|e| VcsError::Unreachable {
            reason: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VcsError::CommandFailed {
                command: format!("HTTP {status}"),
                reason: body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl VersionControl for HttpGitService {
    async fn status(&self) -> Result<GitStatus, VcsError> {
        let mut status = self
            .send(self.client.get(self.url("/git/status")))
            .await?
            .json::<GitStatus>()
            .await
            .map_err(|e| VcsError::InvalidResponse(e.to_string()))?;
        status.uncommitted_files = status
            .uncommitted_files
            .iter()
            .map(|line| status_line_path(line))
            .collect();
        Ok(status)
    }

    async fn stash(&self) -> Result<bool, VcsError> {
        let body: StashResponse = self
            .send(self.client.post(self.url("/git/stash")))
            .await?
            .json()
            .await
            .map_err(|e| VcsError::InvalidResponse(e.to_string()))?;
        if body.stashed {
            info!("Remote git service stashed changes");
        }
        Ok(body.stashed)
    }

    async fn unstash(&self) -> Result<bool, VcsError> {
        let body: PopResponse = self
            .send(self.client.post(self.url("/git/stash-pop")))
            .await?
            .json()
            .await
            .map_err(|e| VcsError::InvalidResponse(e.to_string()))?;
        Ok(body.popped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let svc = HttpGitService::new("http://git_service:8001/", Duration::from_secs(2)).unwrap();
        assert_eq!(svc.url("/git/status"), "http://git_service:8001/git/status");
    }

    #[test]
    fn status_payload_shape_parses() {
        let json = serde_json::json!({
            "is_clean": false,
            "is_detached": false,
            "uncommitted_files": ["README.md"],
            "current_commit": {"hash": "abc123", "message": "init"}
        });
        let status: GitStatus = serde_json::from_value(json).unwrap();
        assert!(!status.is_clean);
        assert_eq!(status.current_commit.hash, "abc123");
        assert_eq!(status.uncommitted_files, vec!["README.md"]);
    }

    #[test]
    fn status_lines_reduce_to_paths() {
        assert_eq!(status_line_path("M README.md"), "README.md");
        assert_eq!(status_line_path("?? notes/todo.txt"), "notes/todo.txt");
        assert_eq!(status_line_path("R  old.rs -> new.rs"), "new.rs");
        assert_eq!(status_line_path("Makefile"), "Makefile");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_collaborator_error() {
        let svc = HttpGitService::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            svc.status().await,
            Err(VcsError::Unreachable { .. })
        ));
    }
}
