//! Types for the pipeline orchestrator.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::host::HostError;
use crate::pipeline::{Module, Stage};

use super::config::RunConfig;

/// Process exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code for a failed run (module failure, deadline, fatal error).
pub const EXIT_FAILURE: i32 = 1;
/// Process exit code for an invalid invocation.
pub const EXIT_USAGE: i32 = 2;

/// Errors that can abort a reconciliation turn.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Host or blob store error.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Stage input could not be prepared locally.
    #[error("failed to stage {stage} input at {path}: {source}")]
    Staging {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Run state invariant broken.
    #[error("invalid run state: {0}")]
    InvalidState(String),
}

impl OrchestratorError {
    /// Fatal errors end the run; the rest only abort the current turn.
    pub fn is_fatal(&self) -> bool {
        match self {
            OrchestratorError::Host(HostError::Io { .. }) => true,
            OrchestratorError::Host(_) => false,
            OrchestratorError::Staging { .. } | OrchestratorError::InvalidState(_) => true,
        }
    }
}

/// Where the run loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Reconciling,
    Terminated,
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Final-stage modules reported `Failed`.
    ModuleFailed(Vec<Module>),
    DeadlineExceeded,
    /// Every trigger stopped before the run finished.
    TriggersClosed,
    Fatal(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ModuleFailed(modules) => {
                let names: Vec<&str> = modules.iter().map(|m| m.as_str()).collect();
                write!(f, "module(s) failed: {}", names.join(", "))
            }
            FailureReason::DeadlineExceeded => f.write_str("deadline exceeded"),
            FailureReason::TriggersClosed => f.write_str("all triggers stopped"),
            FailureReason::Fatal(message) => write!(f, "fatal error: {}", message),
        }
    }
}

/// Terminal outcome of a run. Each outcome maps to exactly one exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded { output: PathBuf },
    Failed(FailureReason),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Succeeded { .. } => EXIT_SUCCESS,
            RunOutcome::Failed(_) => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Succeeded { output } => write!(f, "succeeded, output at {:?}", output),
            RunOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// What one reconciliation turn did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Idle,
    Submitted(Stage),
    Terminated(RunOutcome),
}

impl TurnOutcome {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            TurnOutcome::Idle => "idle",
            TurnOutcome::Submitted(_) => "submitted",
            TurnOutcome::Terminated(_) => "terminated",
        }
    }
}

/// Parameters of a single run.
#[derive(Debug, Clone, Serialize)]
pub struct RunParams {
    pub project_id: Uuid,
    /// Local artifact every stage input is staged from.
    pub source_path: PathBuf,
    /// Directory the pipeline output is downloaded into.
    pub destination_path: PathBuf,
}

impl RunParams {
    pub fn new(
        project_id: Uuid,
        source_path: impl Into<PathBuf>,
        destination_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_id,
            source_path: source_path.into(),
            destination_path: destination_path.into(),
        }
    }

    /// Staging directory: configured, else the source's parent directory.
    pub fn staging_dir(&self, config: &RunConfig) -> PathBuf {
        if let Some(dir) = &config.staging_dir {
            return dir.clone();
        }
        match self.source_path.parent() {
            Some(parent) if parent != Path::new("") => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let ok = RunOutcome::Succeeded {
            output: PathBuf::from("/out/results.zip"),
        };
        assert_eq!(ok.exit_code(), EXIT_SUCCESS);
        assert!(ok.is_success());

        for reason in [
            FailureReason::ModuleFailed(vec![Module::Energy]),
            FailureReason::DeadlineExceeded,
            FailureReason::TriggersClosed,
            FailureReason::Fatal("boom".into()),
        ] {
            assert_eq!(RunOutcome::Failed(reason).exit_code(), EXIT_FAILURE);
        }
    }

    #[test]
    fn test_fatal_classification() {
        let transient = OrchestratorError::Host(HostError::Timeout);
        assert!(!transient.is_fatal());

        let local_io = OrchestratorError::Host(HostError::Io {
            path: PathBuf::from("/tmp/x"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert!(local_io.is_fatal());

        assert!(OrchestratorError::InvalidState("double submit".into()).is_fatal());
    }

    #[test]
    fn test_staging_dir_resolution() {
        let params = RunParams::new(Uuid::nil(), "/data/project/input.zip", "/data/out");
        assert_eq!(
            params.staging_dir(&RunConfig::default()),
            PathBuf::from("/data/project")
        );

        let relative = RunParams::new(Uuid::nil(), "input.zip", "out");
        assert_eq!(relative.staging_dir(&RunConfig::default()), PathBuf::from("."));

        let config = RunConfig {
            staging_dir: Some(PathBuf::from("/scratch")),
            ..RunConfig::default()
        };
        assert_eq!(params.staging_dir(&config), PathBuf::from("/scratch"));
    }

    #[test]
    fn test_failure_display() {
        let reason = FailureReason::ModuleFailed(vec![Module::Loads, Module::Exports]);
        assert_eq!(reason.to_string(), "module(s) failed: loads, exports");
    }
}
