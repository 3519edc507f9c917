//! Mock status source for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::host::{HostError, StatusSource};
use crate::pipeline::{JobStatus, JobStatusEntry, Module, Stage, StatusSnapshot};

/// Mock implementation of the StatusSource trait.
///
/// Serves a current snapshot that tests mutate, optionally preceded by a
/// script of snapshots consumed one per fetch. Clones share state.
///
/// # Example
///
/// ```rust,ignore
/// let statuses = MockStatusSource::new();
/// statuses.set_stage(Stage::CfdRans, JobStatus::Completed).await;
/// statuses.push_snapshot(snapshot_of(&[(Module::Objects, JobStatus::InProgress)])).await;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockStatusSource {
    current: Arc<RwLock<StatusSnapshot>>,
    script: Arc<RwLock<VecDeque<StatusSnapshot>>>,
    next_error: Arc<RwLock<Option<HostError>>>,
    fetches: Arc<RwLock<Vec<Uuid>>>,
}

impl MockStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given snapshot.
    pub fn with_snapshot(snapshot: StatusSnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(snapshot)),
            ..Self::default()
        }
    }

    /// Replace the current snapshot.
    pub async fn set_snapshot(&self, snapshot: StatusSnapshot) {
        *self.current.write().await = snapshot;
    }

    /// Queue a snapshot for a later fetch. Once served it becomes current.
    pub async fn push_snapshot(&self, snapshot: StatusSnapshot) {
        self.script.write().await.push_back(snapshot);
    }

    /// Append one entry to the current snapshot (it becomes the latest).
    pub async fn record(&self, job_id: &str, module: Module, status: JobStatus) {
        let mut current = self.current.write().await;
        let mut entries = current.entries().to_vec();
        entries.push(JobStatusEntry::new(job_id, module, status));
        *current = StatusSnapshot::new(entries);
    }

    /// Append an entry with `status` for every module of `stage`.
    pub async fn set_stage(&self, stage: Stage, status: JobStatus) {
        for module in stage.required_modules() {
            self.record(&format!("{}-job", module), *module, status).await;
        }
    }

    /// Make the next fetch fail.
    pub async fn set_next_error(&self, error: HostError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }

    /// Project ids of all fetches, in order.
    pub async fn fetched_projects(&self) -> Vec<Uuid> {
        self.fetches.read().await.clone()
    }
}

#[async_trait]
impl StatusSource for MockStatusSource {
    async fn fetch_statuses(&self, project_id: Uuid) -> Result<StatusSnapshot, HostError> {
        self.fetches.write().await.push(project_id);

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        if let Some(next) = self.script.write().await.pop_front() {
            *self.current.write().await = next;
        }
        Ok(self.current.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_current() {
        let source = MockStatusSource::new();
        source
            .push_snapshot(StatusSnapshot::new(vec![JobStatusEntry::new(
                "t",
                Module::Terrain,
                JobStatus::InProgress,
            )]))
            .await;

        let id = Uuid::new_v4();
        let first = source.fetch_statuses(id).await.unwrap();
        assert_eq!(first.len(), 1);

        // Script exhausted: the last served snapshot stays current.
        let second = source.fetch_statuses(id).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(source.fetch_count().await, 2);
    }

    #[tokio::test]
    async fn test_next_error_is_one_shot() {
        let source = MockStatusSource::new();
        source.set_next_error(HostError::Timeout).await;

        let id = Uuid::new_v4();
        assert!(source.fetch_statuses(id).await.is_err());
        assert!(source.fetch_statuses(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_stage_appends_latest() {
        let source = MockStatusSource::new();
        source.set_stage(Stage::CfdRans, JobStatus::InProgress).await;
        source.set_stage(Stage::CfdRans, JobStatus::Completed).await;

        let snapshot = source.fetch_statuses(Uuid::nil()).await.unwrap();
        let latest = snapshot.latest_statuses();
        assert_eq!(latest.get(&Module::Terrain), Some(&JobStatus::Completed));
        assert_eq!(latest.get(&Module::Windfields), Some(&JobStatus::Completed));
    }
}
