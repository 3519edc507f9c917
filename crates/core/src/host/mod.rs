//! Simulation host access: API client, blob transfers and the traits the
//! orchestrator depends on.

mod blob;
mod client;
mod config;
mod types;

pub use blob::{blob_file_name, redact_uri, BlobClient, FALLBACK_OUTPUT_NAME};
pub use client::HostClient;
pub use config::HostConfig;
pub use types::{
    AccessToken, ArtifactTransfer, HostError, JobSubmitter, StatusSource, SubmissionGateway,
};
