//! Mock artifact transfer for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::host::{ArtifactTransfer, HostError, FALLBACK_OUTPUT_NAME};
use crate::pipeline::Stage;

/// A recorded upload for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub destination_uri: String,
    pub local_path: PathBuf,
    /// Whether the local file existed when the upload was made.
    pub file_existed: bool,
}

/// A recorded download for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDownload {
    pub source_uri: String,
    pub destination: PathBuf,
}

/// Mock implementation of the ArtifactTransfer trait.
///
/// URIs are synthetic (`mock://...`). Downloads are recorded but nothing is
/// written; the returned path is `<destination>/project-output.zip`.
#[derive(Debug, Clone, Default)]
pub struct MockArtifactTransfer {
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    downloads: Arc<RwLock<Vec<RecordedDownload>>>,
    upload_errors: Arc<RwLock<VecDeque<HostError>>>,
    download_errors: Arc<RwLock<VecDeque<HostError>>>,
    download_attempts: Arc<RwLock<usize>>,
}

impl MockArtifactTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next upload.
    pub async fn fail_next_upload(&self, error: HostError) {
        self.upload_errors.write().await.push_back(error);
    }

    /// Queue an error for the next download.
    pub async fn fail_next_download(&self, error: HostError) {
        self.download_errors.write().await.push_back(error);
    }

    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }

    pub async fn downloads(&self) -> Vec<RecordedDownload> {
        self.downloads.read().await.clone()
    }

    /// Download calls made, failed ones included.
    pub async fn download_attempts(&self) -> usize {
        *self.download_attempts.read().await
    }
}

#[async_trait]
impl ArtifactTransfer for MockArtifactTransfer {
    async fn input_upload_uri(&self, stage: Stage, project_id: Uuid) -> Result<String, HostError> {
        Ok(format!("mock://upload/{}/{}", project_id, stage))
    }

    async fn output_download_uri(&self, project_id: Uuid) -> Result<String, HostError> {
        Ok(format!("mock://output/{}", project_id))
    }

    async fn upload(&self, destination_uri: &str, local_path: &Path) -> Result<(), HostError> {
        if let Some(error) = self.upload_errors.write().await.pop_front() {
            return Err(error);
        }
        self.uploads.write().await.push(RecordedUpload {
            destination_uri: destination_uri.to_string(),
            local_path: local_path.to_path_buf(),
            file_existed: local_path.exists(),
        });
        Ok(())
    }

    async fn download(&self, source_uri: &str, destination: &Path) -> Result<PathBuf, HostError> {
        *self.download_attempts.write().await += 1;
        if let Some(error) = self.download_errors.write().await.pop_front() {
            return Err(error);
        }
        self.downloads.write().await.push(RecordedDownload {
            source_uri: source_uri.to_string(),
            destination: destination.to_path_buf(),
        });
        Ok(destination.join(FALLBACK_OUTPUT_NAME))
    }
}
