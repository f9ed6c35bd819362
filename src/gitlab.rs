//! GitLab REST client for merge requests.
//!
//! Only two endpoints are used:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | [`GitLabClient::list_open_merge_requests`] | `GET /projects/{id}/merge_requests?state=opened` |
//! | [`GitLabClient::fetch_merge_request_changes`] | `GET /projects/{id}/merge_requests/{iid}/changes` |
//!
//! A non-2xx reply becomes [`GitLabError::Status`], which keeps the upstream
//! status code so the HTTP layer can pass it through unchanged.

use mrdoc_core::models::Change;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::GitLabConfig;

#[derive(Debug, Error)]
pub enum GitLabError {
    #[error("GitLab returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("GitLab request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected GitLab response: {0}")]
    Decode(String),
}

/// Summary row for an open merge request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeRequestSummary {
    pub id: u64,
    pub iid: u64,
    pub title: String,
    pub author: String,
    pub created_at: String,
    pub state: String,
}

#[derive(Deserialize)]
struct RawMergeRequest {
    id: u64,
    iid: u64,
    title: String,
    author: RawAuthor,
    created_at: String,
    state: String,
}

#[derive(Deserialize)]
struct RawAuthor {
    name: String,
}

#[derive(Deserialize)]
struct RawChanges {
    changes: Vec<Change>,
}

pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    token: Option<String>,
}

impl GitLabClient {
    pub fn new(config: &GitLabConfig) -> Result<Self, GitLabError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let token = config
            .access_token
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            token,
        })
    }

    fn project_url(&self, tail: &str) -> String {
        format!("{}/projects/{}/{}", self.base_url, self.project_id, tail)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<T, GitLabError> {
        let mut req = self.http.get(url);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(%status, url, "GitLab request failed");
            return Err(GitLabError::Status {
                status,
                message: format!("Failed to fetch {}", what),
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| GitLabError::Decode(e.to_string()))
    }

    pub async fn list_open_merge_requests(&self) -> Result<Vec<MergeRequestSummary>, GitLabError> {
        let url = self.project_url("merge_requests?state=opened");
        let raw: Vec<RawMergeRequest> = self.get_json(&url, "merge requests").await?;

        Ok(raw
            .into_iter()
            .map(|mr| MergeRequestSummary {
                id: mr.id,
                iid: mr.iid,
                title: mr.title,
                author: mr.author.name,
                created_at: mr.created_at,
                state: mr.state,
            })
            .collect())
    }

    pub async fn fetch_merge_request_changes(&self, mr_id: u64) -> Result<Vec<Change>, GitLabError> {
        let url = self.project_url(&format!("merge_requests/{}/changes", mr_id));
        let raw: RawChanges = self.get_json(&url, "merge request changes").await?;
        tracing::debug!(mr_id, count = raw.changes.len(), "fetched merge request changes");
        Ok(raw.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, token: Option<&str>) -> GitLabConfig {
        GitLabConfig {
            api_base_url: url.to_string(),
            project_id: "42".to_string(),
            access_token: token.map(str::to_string),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_fetch_changes_parses_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/42/merge_requests/7/changes")
            .match_header("authorization", "Bearer t0ken")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"iid": 7, "changes": [
                    {"old_path": "a.py", "new_path": "a.py", "new_file": false,
                     "renamed_file": false, "deleted_file": false, "diff": "x"}
                ]}"#,
            )
            .create_async()
            .await;

        let client = GitLabClient::new(&config(&server.url(), Some("t0ken"))).unwrap();
        let changes = client.fetch_merge_request_changes(7).await.unwrap();

        mock.assert_async().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_path, "a.py");
    }

    #[tokio::test]
    async fn test_upstream_status_preserved() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/projects/42/merge_requests/9/changes")
            .with_status(404)
            .create_async()
            .await;

        let client = GitLabClient::new(&config(&server.url(), None)).unwrap();
        match client.fetch_merge_request_changes(9).await {
            Err(GitLabError::Status { status, .. }) => assert_eq!(status, StatusCode::NOT_FOUND),
            other => panic!("expected status error, got {:?}", other.map(|c| c.len())),
        }
    }

    #[tokio::test]
    async fn test_no_auth_header_without_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/42/merge_requests")
            .match_query(mockito::Matcher::UrlEncoded("state".into(), "opened".into()))
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(200)
            .with_body(
                r#"[{"id": 100, "iid": 3, "title": "Add slices", "author": {"name": "Dana"},
                     "created_at": "2024-05-01T10:00:00Z", "state": "opened"}]"#,
            )
            .create_async()
            .await;

        let client = GitLabClient::new(&config(&format!("{}/", server.url()), Some("  "))).unwrap();
        let mrs = client.list_open_merge_requests().await.unwrap();

        mock.assert_async().await;
        assert_eq!(mrs[0].iid, 3);
        assert_eq!(mrs[0].author, "Dana");
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/projects/42/merge_requests/1/changes")
            .with_status(200)
            .with_body("{\"changes\": 12}")
            .create_async()
            .await;

        let client = GitLabClient::new(&config(&server.url(), None)).unwrap();
        assert!(matches!(
            client.fetch_merge_request_changes(1).await,
            Err(GitLabError::Decode(_))
        ));
    }
}
