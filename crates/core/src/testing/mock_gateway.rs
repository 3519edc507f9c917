//! Mock submission gateway for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::host::{AccessToken, HostError, SubmissionGateway};
use crate::pipeline::{JobStatus, Stage};

use super::MockStatusSource;

/// A recorded submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub stage: Stage,
    pub project_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Mock implementation of the SubmissionGateway trait.
///
/// Records every successful submission. Queued errors are returned by the
/// next calls, one per call. When linked to a [`MockStatusSource`], a
/// successful submission shows the stage's modules as `Created` there.
#[derive(Debug, Clone, Default)]
pub struct MockSubmissionGateway {
    submissions: Arc<RwLock<Vec<RecordedSubmission>>>,
    errors: Arc<RwLock<VecDeque<HostError>>>,
    attempts: Arc<RwLock<usize>>,
    linked: Option<MockStatusSource>,
}

impl MockSubmissionGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reflect submissions in `statuses`.
    pub fn linked_to(statuses: MockStatusSource) -> Self {
        Self {
            linked: Some(statuses),
            ..Self::default()
        }
    }

    /// Queue an error for the next call.
    pub async fn fail_next(&self, error: HostError) {
        self.errors.write().await.push_back(error);
    }

    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    pub async fn submitted_stages(&self) -> Vec<Stage> {
        self.submissions.read().await.iter().map(|s| s.stage).collect()
    }

    pub async fn submission_count(&self, stage: Stage) -> usize {
        self.submissions
            .read()
            .await
            .iter()
            .filter(|s| s.stage == stage)
            .count()
    }

    /// Calls made, failed ones included.
    pub async fn attempts(&self) -> usize {
        *self.attempts.read().await
    }
}

#[async_trait]
impl SubmissionGateway for MockSubmissionGateway {
    async fn submit(&self, stage: Stage, project_id: Uuid) -> Result<AccessToken, HostError> {
        *self.attempts.write().await += 1;

        if let Some(error) = self.errors.write().await.pop_front() {
            return Err(error);
        }

        self.submissions.write().await.push(RecordedSubmission {
            stage,
            project_id,
            timestamp: Utc::now(),
        });

        if let Some(statuses) = &self.linked {
            statuses.set_stage(stage, JobStatus::Created).await;
        }

        Ok(AccessToken::new("mock-token"))
    }
}
