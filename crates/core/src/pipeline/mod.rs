//! Pipeline model and gating logic.
//!
//! The pipeline has three stages, each gated on the full completion of
//! every stage before it:
//! - **cfd_rans**: Terrain, Windfields (submitted before reconciliation starts)
//! - **synthesis**: Objects, WindResources
//! - **aep**: Loads, Energy, Exports (its completion ends the run)

mod tracker;
mod types;

pub use tracker::{Action, PipelineProgress, PipelineStateTracker, Termination};
pub use types::{
    JobStatus, JobStatusEntry, Module, Stage, StageState, StageStates, StatusSnapshot,
    UnknownVariant,
};
