//! Testing utilities and mock implementations.
//!
//! Mocks for every host-facing trait, so whole runs can be driven through
//! the orchestrator without a real host.
//!
//! # Example
//!
//! ```rust,ignore
//! use windrun_core::testing::{MockArtifactTransfer, MockStatusSource, MockSubmissionGateway};
//!
//! let statuses = MockStatusSource::new();
//! let gateway = MockSubmissionGateway::linked_to(statuses.clone());
//! let transfer = MockArtifactTransfer::new();
//!
//! statuses.set_stage(Stage::CfdRans, JobStatus::Completed).await;
//! ```

mod mock_gateway;
mod mock_status_source;
mod mock_transfer;

pub use mock_gateway::{MockSubmissionGateway, RecordedSubmission};
pub use mock_status_source::MockStatusSource;
pub use mock_transfer::{MockArtifactTransfer, RecordedDownload, RecordedUpload};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use uuid::Uuid;

    use crate::orchestrator::{RunConfig, RunParams};
    use crate::pipeline::{JobStatus, JobStatusEntry, Module, Stage, StatusSnapshot};

    /// Snapshot with one entry per `(module, status)`, job ids derived from
    /// the module name and position.
    pub fn snapshot_of(entries: &[(Module, JobStatus)]) -> StatusSnapshot {
        entries
            .iter()
            .enumerate()
            .map(|(i, (module, status))| JobStatusEntry::new(format!("{}-{}", module, i), *module, *status))
            .collect()
    }

    /// Every module of `stages` with the same status.
    pub fn stages_with(stages: &[Stage], status: JobStatus) -> Vec<(Module, JobStatus)> {
        stages
            .iter()
            .flat_map(|stage| stage.required_modules().iter().map(move |m| (*m, status)))
            .collect()
    }

    /// Write a small source artifact into `dir`.
    pub fn source_artifact(dir: &Path) -> PathBuf {
        let path = dir.join("project-input.zip");
        std::fs::write(&path, b"PK\x03\x04windrun-test-input").expect("write source artifact");
        path
    }

    /// Run parameters with a fresh project id, source in `dir`, output in `dir/out`.
    pub fn run_params(dir: &Path) -> RunParams {
        RunParams::new(Uuid::new_v4(), source_artifact(dir), dir.join("out"))
    }

    /// Run config without the settle delay.
    pub fn fast_run_config(deadline_secs: u64) -> RunConfig {
        RunConfig {
            deadline_secs,
            settle_delay_ms: 0,
            staging_dir: None,
        }
    }
}
