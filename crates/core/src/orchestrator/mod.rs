//! Pipeline orchestrator.
//!
//! Submits the first stage, then reconciles on every wake-up: fetch a
//! snapshot, ask the tracker what to do, enact it. Ends on success, module
//! failure, a fatal error or the deadline.

mod config;
mod runner;
mod types;

pub use config::{RunConfig, MAX_DEADLINE_SECS};
pub use runner::PipelineOrchestrator;
pub use types::{
    FailureReason, OrchestratorError, RunOutcome, RunParams, RunPhase, TurnOutcome, EXIT_FAILURE,
    EXIT_SUCCESS, EXIT_USAGE,
};
