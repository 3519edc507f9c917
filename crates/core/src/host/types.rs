//! Types and traits for talking to the simulation host.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::{Stage, StatusSnapshot};

/// Errors that can occur while talking to the host or the blob store.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("API error: {0}")]
    ApiError(String),
}

impl HostError {
    /// Whether retrying the same request may succeed.
    ///
    /// Covers network failures, timeouts, 5xx, 408 and 404. The host answers
    /// 404 for resources it has not created yet.
    pub fn is_transient(&self) -> bool {
        match self {
            HostError::ConnectionFailed(_) | HostError::Timeout => true,
            HostError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 404,
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HostError::Timeout
        } else if e.is_connect() || e.is_request() {
            HostError::ConnectionFailed(e.to_string())
        } else if let Some(status) = e.status() {
            HostError::Status {
                status: status.as_u16(),
                endpoint: e.url().map(|u| u.path().to_string()).unwrap_or_default(),
            }
        } else if e.is_decode() {
            HostError::InvalidResponse(e.to_string())
        } else {
            HostError::ApiError(e.to_string())
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        HostError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Bearer token issued by the host. Redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Source of job statuses for a project.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the status of every job of the project.
    async fn fetch_statuses(&self, project_id: Uuid) -> Result<StatusSnapshot, HostError>;
}

/// Submits a stage's job to the host, exactly one attempt per call.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit_job(&self, stage: Stage, project_id: Uuid) -> Result<AccessToken, HostError>;
}

#[async_trait]
impl<T: JobSubmitter + ?Sized> JobSubmitter for Arc<T> {
    async fn submit_job(&self, stage: Stage, project_id: Uuid) -> Result<AccessToken, HostError> {
        (**self).submit_job(stage, project_id).await
    }
}

/// Submits a stage's job with the retry policy applied.
///
/// Implementations surface the final error after retries are exhausted.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    async fn submit(&self, stage: Stage, project_id: Uuid) -> Result<AccessToken, HostError>;
}

/// Moves stage inputs to the host and pipeline outputs back.
#[async_trait]
pub trait ArtifactTransfer: Send + Sync {
    /// Pre-signed URI the stage input must be uploaded to.
    async fn input_upload_uri(&self, stage: Stage, project_id: Uuid) -> Result<String, HostError>;

    /// Pre-signed URI the project output can be downloaded from.
    async fn output_download_uri(&self, project_id: Uuid) -> Result<String, HostError>;

    /// Upload a local file to a pre-signed destination.
    async fn upload(&self, destination_uri: &str, local_path: &Path) -> Result<(), HostError>;

    /// Download a blob into the `destination` directory. Returns the written file.
    async fn download(&self, source_uri: &str, destination: &Path) -> Result<PathBuf, HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(HostError::Timeout.is_transient());
        assert!(HostError::ConnectionFailed("refused".into()).is_transient());
        for status in [404, 408, 500, 502, 503] {
            let err = HostError::Status {
                status,
                endpoint: "/api".into(),
            };
            assert!(err.is_transient(), "{status} should be transient");
        }
        for status in [400, 401, 403, 409] {
            let err = HostError::Status {
                status,
                endpoint: "/api".into(),
            };
            assert!(!err.is_transient(), "{status} should not be transient");
        }
        assert!(!HostError::AuthenticationFailed("bad".into()).is_transient());
        assert!(!HostError::InvalidResponse("junk".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = HostError::Status {
            status: 503,
            endpoint: "/api/AEP/SubmitJob".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503 from /api/AEP/SubmitJob");
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("secret-bearer");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.as_str(), "secret-bearer");
    }
}
