//! Background index tasks with observable state.
//!
//! Each index build is tracked under a key (`mr-{id}` for a merge request,
//! `docs` for the documentation corpus). A key moves through
//!
//! ```text
//! pending ──▶ running ──▶ complete
//!                    └──▶ failed
//! ```
//!
//! [`IndexTasks::begin`] refuses a key whose task is still pending or
//! running, so two requests for the same merge request can never race on
//! its change log or index directory. Finished tasks may be restarted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Complete,
    Failed,
}

impl TaskState {
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub key: String,
    /// Unique per run; changes every time the key is restarted.
    pub run_id: String,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("index task '{key}' is already {state:?}")]
pub struct TaskConflict {
    pub key: String,
    pub state: TaskState,
}

/// Task key for a merge request index.
pub fn merge_request_key(mr_id: u64) -> String {
    format!("mr-{}", mr_id)
}

/// Task key for the documentation index.
pub const DOCS_KEY: &str = "docs";

/// Shared table of index tasks. Cheap to clone.
#[derive(Clone, Default)]
pub struct IndexTasks {
    inner: Arc<RwLock<HashMap<String, TaskRecord>>>,
}

impl IndexTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` as pending. Fails if a run is already pending or running.
    pub fn begin(&self, key: &str) -> Result<TaskRecord, TaskConflict> {
        let mut table = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = table.get(key) {
            if existing.state.is_active() {
                return Err(TaskConflict {
                    key: key.to_string(),
                    state: existing.state,
                });
            }
        }

        let now = Utc::now();
        let record = TaskRecord {
            key: key.to_string(),
            run_id: Uuid::new_v4().to_string(),
            state: TaskState::Pending,
            created_at: now,
            updated_at: now,
            error: None,
        };
        table.insert(key.to_string(), record.clone());
        tracing::debug!(key, run_id = %record.run_id, "index task pending");
        Ok(record)
    }

    pub fn get(&self, key: &str) -> Option<TaskRecord> {
        let table = self.inner.read().unwrap_or_else(|e| e.into_inner());
        table.get(key).cloned()
    }

    fn transition(&self, key: &str, run_id: &str, state: TaskState, error: Option<String>) {
        let mut table = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = table.get_mut(key) {
            if record.run_id != run_id {
                return;
            }
            record.state = state;
            record.updated_at = Utc::now();
            record.error = error;
        }
    }

    /// Run `work` for an already-claimed record, recording its outcome.
    pub async fn run<F, T>(&self, record: &TaskRecord, work: F)
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.transition(&record.key, &record.run_id, TaskState::Running, None);
        tracing::info!(key = %record.key, "index task running");

        match work.await {
            Ok(_) => {
                self.transition(&record.key, &record.run_id, TaskState::Complete, None);
                tracing::info!(key = %record.key, "index task complete");
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!(key = %record.key, error = %message, "index task failed");
                self.transition(&record.key, &record.run_id, TaskState::Failed, Some(message));
            }
        }
    }

    /// Mark a claimed run as failed before any work was spawned for it.
    pub fn fail(&self, record: &TaskRecord, error: impl Into<String>) {
        let message = error.into();
        tracing::error!(key = %record.key, error = %message, "index task failed");
        self.transition(&record.key, &record.run_id, TaskState::Failed, Some(message));
    }

    /// Run `work` for a claimed record on the tokio runtime without waiting.
    pub fn spawn<F, T>(&self, record: &TaskRecord, work: F)
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let tasks = self.clone();
        let claimed = record.clone();
        tokio::spawn(async move {
            tasks.run(&claimed, work).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn wait_for(tasks: &IndexTasks, key: &str, state: TaskState) -> TaskRecord {
        for _ in 0..200 {
            if let Some(record) = tasks.get(key) {
                if record.state == state {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {} never reached {:?}", key, state);
    }

    #[test]
    fn test_begin_rejects_active_key() {
        let tasks = IndexTasks::new();
        tasks.begin("mr-1").unwrap();
        let err = tasks.begin("mr-1").unwrap_err();
        assert_eq!(err.state, TaskState::Pending);
        assert!(tasks.begin("mr-2").is_ok());
    }

    #[tokio::test]
    async fn test_lifecycle_complete() {
        let tasks = IndexTasks::new();
        let (tx, rx) = oneshot::channel::<()>();

        let record = tasks.begin("mr-3").unwrap();
        tasks.spawn(&record, async move {
            rx.await.ok();
            Ok::<_, anyhow::Error>(())
        });

        wait_for(&tasks, "mr-3", TaskState::Running).await;
        let err = tasks.begin("mr-3").unwrap_err();
        assert_eq!(err.state, TaskState::Running);

        tx.send(()).unwrap();
        let done = wait_for(&tasks, "mr-3", TaskState::Complete).await;
        assert!(done.error.is_none());
        assert!(!done.state.is_active());
    }

    #[tokio::test]
    async fn test_failure_recorded_and_restartable() {
        let tasks = IndexTasks::new();
        let record = tasks.begin("docs").unwrap();
        tasks.spawn(&record, async { Err::<(), _>(anyhow::anyhow!("disk full")) });

        let failed = wait_for(&tasks, "docs", TaskState::Failed).await;
        assert_eq!(failed.error.as_deref(), Some("disk full"));

        let again = tasks.begin("docs").unwrap();
        assert_ne!(again.run_id, failed.run_id);
        tasks.spawn(&again, async { Ok::<_, anyhow::Error>(()) });
        wait_for(&tasks, "docs", TaskState::Complete).await;
    }

    #[test]
    fn test_fail_before_spawn() {
        let tasks = IndexTasks::new();
        let record = tasks.begin("mr-4").unwrap();
        tasks.fail(&record, "GitLab returned 404 Not Found");
        let current = tasks.get("mr-4").unwrap();
        assert_eq!(current.state, TaskState::Failed);
        assert!(tasks.begin("mr-4").is_ok());
    }

    #[test]
    fn test_stale_run_does_not_overwrite() {
        let tasks = IndexTasks::new();
        let first = tasks.begin("mr-9").unwrap();
        tasks.transition("mr-9", &first.run_id, TaskState::Complete, None);
        let second = tasks.begin("mr-9").unwrap();

        tasks.transition("mr-9", &first.run_id, TaskState::Failed, Some("late".into()));
        let current = tasks.get("mr-9").unwrap();
        assert_eq!(current.run_id, second.run_id);
        assert_eq!(current.state, TaskState::Pending);
    }

    #[test]
    fn test_keys() {
        assert_eq!(merge_request_key(42), "mr-42");
    }
}
