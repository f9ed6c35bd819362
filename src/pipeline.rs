//! Request pipeline shared by the HTTP server and the CLI.
//!
//! ```text
//! GitLab changes ──▶ FilterPolicy ──▶ change log ({changes_dir}/{id}.txt)
//!                                 └─▶ documents ──▶ IndexBuilder ({index_dir}/{id})
//! ```
//!
//! Filtering, formatting and document building happen inline and are
//! all-or-nothing. Index construction runs as a tracked background task
//! (see [`crate::tasks`]); the CLI awaits it instead.

use anyhow::Result;
use mrdoc_core::document::build_documents;
use mrdoc_core::models::{Change, RetrievalDocument};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::changelog::{read_change_log, write_change_log};
use crate::config::Config;
use crate::docs::load_documents;
use crate::embedding::create_embedder;
use crate::gitlab::{GitLabClient, GitLabError};
use crate::index::{IndexBuilder, IndexSummary};
use crate::prompts::{choose_prompt, PromptKind};
use crate::tasks::{merge_request_key, IndexTasks, TaskConflict, TaskRecord, DOCS_KEY};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Conflict(#[from] TaskConflict),

    #[error(transparent)]
    GitLab(#[from] GitLabError),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Output of the inline stage for one merge request.
#[derive(Debug, Clone)]
pub struct PreparedMergeRequest {
    pub mr_id: u64,
    /// Number of changes GitLab returned before filtering.
    pub fetched: usize,
    pub changes: Vec<Change>,
    pub documents: Vec<RetrievalDocument>,
    pub change_log_path: PathBuf,
}

/// Long-lived collaborators, built once from the configuration.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub gitlab: Arc<GitLabClient>,
    pub indexer: Arc<IndexBuilder>,
    pub tasks: IndexTasks,
}

impl Services {
    pub fn from_config(config: Config) -> Result<Self> {
        let gitlab = GitLabClient::new(&config.gitlab)?;
        let embedder = create_embedder(&config.embedding)?;
        let indexer = IndexBuilder::new(
            config.chunking.clone(),
            embedder,
            config.embedding.batch_size,
        );

        Ok(Self {
            config: Arc::new(config),
            gitlab: Arc::new(gitlab),
            indexer: Arc::new(indexer),
            tasks: IndexTasks::new(),
        })
    }

    /// Fetch, filter, persist the change log, and build documents.
    pub async fn prepare_merge_request(&self, mr_id: u64) -> Result<PreparedMergeRequest, PipelineError> {
        let fetched = self.gitlab.fetch_merge_request_changes(mr_id).await?;
        let fetched_count = fetched.len();

        let changes = self.config.change_filter().filter_changes(fetched);
        tracing::info!(
            mr_id,
            fetched = fetched_count,
            retained = changes.len(),
            "filtered merge request changes"
        );

        let change_log_path = write_change_log(&self.config.storage.changes_dir, mr_id, &changes)?;
        let documents = build_documents(&changes);

        Ok(PreparedMergeRequest {
            mr_id,
            fetched: fetched_count,
            changes,
            documents,
            change_log_path,
        })
    }

    /// Claim the merge request's task, run the inline stage, and schedule
    /// the index build in the background.
    ///
    /// Fails with [`PipelineError::Conflict`] while a previous build for the
    /// same merge request is pending or running; in that case nothing is
    /// fetched or written.
    pub async fn start_merge_request(
        &self,
        mr_id: u64,
    ) -> Result<(PreparedMergeRequest, TaskRecord), PipelineError> {
        let record = self.tasks.begin(&merge_request_key(mr_id))?;

        let prepared = match self.prepare_merge_request(mr_id).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.tasks.fail(&record, e.to_string());
                return Err(e);
            }
        };

        let indexer = self.indexer.clone();
        let documents = prepared.documents.clone();
        let dir = self.config.storage.merge_request_index_dir(mr_id);
        self.tasks.spawn(&record, async move {
            indexer.build(&documents, &dir).await
        });

        Ok((prepared, record))
    }

    /// Run the whole pipeline for one merge request, waiting for the index.
    pub async fn index_merge_request(&self, mr_id: u64) -> Result<(PreparedMergeRequest, IndexSummary), PipelineError> {
        let prepared = self.prepare_merge_request(mr_id).await?;
        let dir = self.config.storage.merge_request_index_dir(mr_id);
        let summary = self.indexer.build(&prepared.documents, &dir).await?;
        Ok((prepared, summary))
    }

    fn load_docs(&self) -> Result<Vec<RetrievalDocument>> {
        load_documents(&self.config.docs, &self.config.docs_filter())
    }

    /// Load the documentation corpus and schedule its index build.
    ///
    /// Returns the task record and the number of documents queued.
    pub fn start_docs_index(&self) -> Result<(TaskRecord, usize), PipelineError> {
        let record = self.tasks.begin(DOCS_KEY)?;

        let documents = match self.load_docs() {
            Ok(documents) => documents,
            Err(e) => {
                self.tasks.fail(&record, format!("{:#}", e));
                return Err(e.into());
            }
        };
        let count = documents.len();

        let indexer = self.indexer.clone();
        let dir = self.config.storage.docs_index_dir.clone();
        self.tasks.spawn(&record, async move {
            indexer.build(&documents, &dir).await
        });

        Ok((record, count))
    }

    /// Build the documentation index and wait for it.
    pub async fn index_docs(&self) -> Result<IndexSummary> {
        let documents = self.load_docs()?;
        self.indexer
            .build(&documents, &self.config.storage.docs_index_dir)
            .await
    }

    /// Render the `kind` prompt for `mr_id` from its persisted change log.
    /// A non-blank `custom` prompt is returned as is.
    pub fn render_prompt(
        &self,
        mr_id: u64,
        kind: PromptKind,
        custom: Option<&str>,
    ) -> Result<String, PipelineError> {
        let log = read_change_log(&self.config.storage.changes_dir, mr_id)?.ok_or_else(|| {
            PipelineError::NotFound(format!("no change log for merge request {}", mr_id))
        })?;
        Ok(choose_prompt(custom, || kind.render(&log)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::tasks::TaskState;
    use tempfile::TempDir;

    const CHANGES_BODY: &str = r#"{
        "changes": [
            {"old_path": "src/app.py", "new_path": "src/app.py", "new_file": false,
             "renamed_file": false, "deleted_file": false, "diff": "@@ -1 +1 @@\n-a\n+b"},
            {"old_path": "Cargo.lock", "new_path": "Cargo.lock", "new_file": false,
             "renamed_file": false, "deleted_file": false, "diff": "lock"},
            {"old_path": "tests/test_app.py", "new_path": "tests/test_app.py", "new_file": true,
             "renamed_file": false, "deleted_file": false, "diff": "+def test(): pass"}
        ]
    }"#;

    fn services(base_url: &str, tmp: &TempDir) -> Services {
        let toml = format!(
            r#"
[gitlab]
api_base_url = "{base}"
project_id = "42"

[filter]
exclude_extensions = ["lock"]
exclude_folders = ["tests"]

[docs]
root = "{root}/docs"

[storage]
changes_dir = "{root}/changes"
index_dir = "{root}/indexes/mr"
docs_index_dir = "{root}/indexes/docs"
"#,
            base = base_url,
            root = tmp.path().display()
        );
        let config = parse_config(&toml, |_| None).unwrap();
        Services::from_config(config).unwrap()
    }

    #[tokio::test]
    async fn test_prepare_filters_and_writes_log() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/projects/42/merge_requests/7/changes")
            .with_status(200)
            .with_body(CHANGES_BODY)
            .create_async()
            .await;
        let tmp = TempDir::new().unwrap();
        let services = services(&server.url(), &tmp);

        let prepared = services.prepare_merge_request(7).await.unwrap();
        assert_eq!(prepared.fetched, 3);
        assert_eq!(prepared.changes.len(), 1);
        assert_eq!(prepared.documents.len(), 1);

        let log = std::fs::read_to_string(&prepared.change_log_path).unwrap();
        assert!(log.contains("new_path: src/app.py"));
        assert!(!log.contains("Cargo.lock"));
    }

    #[tokio::test]
    async fn test_failed_fetch_marks_task_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/projects/42/merge_requests/8/changes")
            .with_status(404)
            .create_async()
            .await;
        let tmp = TempDir::new().unwrap();
        let services = services(&server.url(), &tmp);

        let err = services.start_merge_request(8).await.unwrap_err();
        assert!(matches!(err, PipelineError::GitLab(GitLabError::Status { .. })));

        let record = services.tasks.get(&merge_request_key(8)).unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert!(!tmp.path().join("changes/8.txt").exists());
    }

    #[tokio::test]
    async fn test_active_task_conflicts_without_fetching() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/42/merge_requests/9/changes")
            .with_status(200)
            .with_body(CHANGES_BODY)
            .expect(0)
            .create_async()
            .await;
        let tmp = TempDir::new().unwrap();
        let services = services(&server.url(), &tmp);

        services.tasks.begin(&merge_request_key(9)).unwrap();
        let err = services.start_merge_request(9).await.unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_index_merge_request_writes_manifest() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/projects/42/merge_requests/5/changes")
            .with_status(200)
            .with_body(CHANGES_BODY)
            .create_async()
            .await;
        let tmp = TempDir::new().unwrap();
        let services = services(&server.url(), &tmp);

        let (_, summary) = services.index_merge_request(5).await.unwrap();
        assert_eq!(summary.documents, 1);
        assert!(tmp.path().join("indexes/mr/5/index.json").exists());
    }

    #[test]
    fn test_render_prompt_requires_change_log() {
        let tmp = TempDir::new().unwrap();
        let services = services("http://127.0.0.1:9", &tmp);
        assert!(matches!(
            services.render_prompt(1, PromptKind::Documentation, None),
            Err(PipelineError::NotFound(_))
        ));

        write_change_log(&services.config.storage.changes_dir, 1, &[]).unwrap();
        let prompt = services.render_prompt(1, PromptKind::Documentation, None).unwrap();
        assert!(prompt.contains("###"));
        let summary = services.render_prompt(1, PromptKind::Summary, None).unwrap();
        assert!(summary.contains("major code changes"));
        assert_eq!(
            services.render_prompt(1, PromptKind::Summary, Some("custom")).unwrap(),
            "custom"
        );
    }
}
