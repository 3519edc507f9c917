//! Gating decisions over a status snapshot.
//!
//! The tracker is pure: it reads a snapshot and the current per-stage
//! submission state and says what should happen next. Enacting the
//! decision (and recording the new stage state) is the orchestrator's job.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::types::{JobStatus, Module, Stage, StageStates, StatusSnapshot};

/// How a run ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// Every final-stage module completed.
    Success,
    /// A final-stage module failed after the final stage was submitted.
    Failure { failed_modules: Vec<Module> },
}

/// An action the orchestrator should enact during the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    SubmitStage { stage: Stage },
    Terminate { termination: Termination },
}

/// Latest status of every module seen in one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineProgress {
    latest: BTreeMap<Module, JobStatus>,
}

impl PipelineProgress {
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Self {
        Self {
            latest: snapshot.latest_statuses(),
        }
    }

    pub fn status_of(&self, module: Module) -> Option<JobStatus> {
        self.latest.get(&module).copied()
    }

    /// A module is satisfied iff its latest status is `Completed`.
    /// Absent modules are never satisfied.
    pub fn module_satisfied(&self, module: Module) -> bool {
        self.status_of(module) == Some(JobStatus::Completed)
    }

    /// A module is pending while its latest status is non-terminal.
    pub fn module_pending(&self, module: Module) -> bool {
        self.status_of(module).is_some_and(|s| !s.is_terminal())
    }

    /// Every module of `stage` completed and nothing in this or any earlier
    /// stage still created or in progress.
    pub fn stage_satisfied(&self, stage: Stage) -> bool {
        let own_complete = stage
            .required_modules()
            .iter()
            .all(|m| self.module_satisfied(*m));

        let nothing_pending = stage
            .up_to()
            .iter()
            .flat_map(|s| s.required_modules())
            .all(|m| !self.module_pending(*m));

        own_complete && nothing_pending
    }

    /// Every stage before `stage` is satisfied. Always true for the first stage.
    pub fn prerequisites_met(&self, stage: Stage) -> bool {
        stage
            .predecessors()
            .iter()
            .all(|s| self.stage_satisfied(*s))
    }

    /// Modules of `stage` whose latest status is `Failed`.
    pub fn failed_modules(&self, stage: Stage) -> Vec<Module> {
        stage
            .required_modules()
            .iter()
            .copied()
            .filter(|m| self.status_of(*m) == Some(JobStatus::Failed))
            .collect()
    }
}

impl fmt::Display for PipelineProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for module in Module::ALL {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match self.status_of(module) {
                Some(status) => write!(f, "{}={}", module, status)?,
                None => write!(f, "{}=-", module)?,
            }
        }
        Ok(())
    }
}

/// Pure decision function from `(snapshot, stage states)` to actions.
pub struct PipelineStateTracker;

impl PipelineStateTracker {
    /// Compute the actions for one reconciliation turn.
    ///
    /// At most one action is returned: a termination supersedes a
    /// submission, and at most one stage is submitted per turn.
    pub fn decide(snapshot: &StatusSnapshot, stages: &StageStates) -> Vec<Action> {
        let progress = PipelineProgress::from_snapshot(snapshot);
        Self::decide_from_progress(&progress, stages)
    }

    pub fn decide_from_progress(progress: &PipelineProgress, stages: &StageStates) -> Vec<Action> {
        if progress.stage_satisfied(Stage::FINAL) {
            return vec![Action::Terminate {
                termination: Termination::Success,
            }];
        }

        if stages.is_submitted(Stage::FINAL) {
            let failed_modules = progress.failed_modules(Stage::FINAL);
            if !failed_modules.is_empty() {
                return vec![Action::Terminate {
                    termination: Termination::Failure { failed_modules },
                }];
            }
        }

        match stages.first_pending() {
            Some(stage) if progress.prerequisites_met(stage) => {
                vec![Action::SubmitStage { stage }]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::JobStatusEntry;

    fn snapshot(entries: &[(&str, Module, JobStatus)]) -> StatusSnapshot {
        entries
            .iter()
            .map(|(id, m, s)| JobStatusEntry::new(*id, *m, *s))
            .collect()
    }

    fn first_stage_submitted() -> StageStates {
        let mut states = StageStates::new();
        states.mark_submitted(Stage::CfdRans);
        states
    }

    fn through(stage: Stage) -> StageStates {
        let mut states = StageStates::new();
        for s in stage.up_to() {
            states.mark_submitted(*s);
        }
        states
    }

    #[test]
    fn test_first_stage_complete_submits_second() {
        let snap = snapshot(&[
            ("j1", Module::Terrain, JobStatus::Completed),
            ("j2", Module::Windfields, JobStatus::Completed),
        ]);
        let actions = PipelineStateTracker::decide(&snap, &first_stage_submitted());
        assert_eq!(
            actions,
            vec![Action::SubmitStage {
                stage: Stage::Synthesis
            }]
        );
    }

    #[test]
    fn test_already_submitted_stage_is_idle() {
        let snap = snapshot(&[
            ("j1", Module::Terrain, JobStatus::Completed),
            ("j2", Module::Windfields, JobStatus::Completed),
        ]);
        let actions = PipelineStateTracker::decide(&snap, &through(Stage::Synthesis));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_partial_second_stage_is_idle() {
        let snap = snapshot(&[
            ("j1", Module::Terrain, JobStatus::Completed),
            ("j2", Module::Windfields, JobStatus::Completed),
            ("j3", Module::Objects, JobStatus::Completed),
            ("j4", Module::WindResources, JobStatus::InProgress),
        ]);
        let actions = PipelineStateTracker::decide(&snap, &through(Stage::Synthesis));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_second_stage_complete_submits_third() {
        let snap = snapshot(&[
            ("j1", Module::Terrain, JobStatus::Completed),
            ("j2", Module::Windfields, JobStatus::Completed),
            ("j3", Module::Objects, JobStatus::Completed),
            ("j4", Module::WindResources, JobStatus::Completed),
        ]);
        let actions = PipelineStateTracker::decide(&snap, &through(Stage::Synthesis));
        assert_eq!(actions, vec![Action::SubmitStage { stage: Stage::Aep }]);
    }

    #[test]
    fn test_third_stage_requires_first_stage_completed_too() {
        // Terrain was resubmitted upstream and is running again.
        let snap = snapshot(&[
            ("j1", Module::Terrain, JobStatus::InProgress),
            ("j2", Module::Windfields, JobStatus::Completed),
            ("j3", Module::Objects, JobStatus::Completed),
            ("j4", Module::WindResources, JobStatus::Completed),
        ]);
        let actions = PipelineStateTracker::decide(&snap, &through(Stage::Synthesis));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_all_final_modules_completed_terminates_success() {
        let snap = snapshot(&[
            ("j1", Module::Terrain, JobStatus::Completed),
            ("j2", Module::Windfields, JobStatus::Completed),
            ("j3", Module::Objects, JobStatus::Completed),
            ("j4", Module::WindResources, JobStatus::Completed),
            ("j5", Module::Loads, JobStatus::Completed),
            ("j6", Module::Energy, JobStatus::Completed),
            ("j7", Module::Exports, JobStatus::Completed),
        ]);
        let actions = PipelineStateTracker::decide(&snap, &through(Stage::Aep));
        assert_eq!(
            actions,
            vec![Action::Terminate {
                termination: Termination::Success
            }]
        );
    }

    #[test]
    fn test_final_module_failure_after_submission_terminates_failure() {
        let snap = snapshot(&[
            ("j1", Module::Terrain, JobStatus::Completed),
            ("j2", Module::Windfields, JobStatus::Completed),
            ("j3", Module::Objects, JobStatus::Completed),
            ("j4", Module::WindResources, JobStatus::Completed),
            ("j5", Module::Energy, JobStatus::Failed),
        ]);
        let actions = PipelineStateTracker::decide(&snap, &through(Stage::Aep));
        assert_eq!(
            actions,
            vec![Action::Terminate {
                termination: Termination::Failure {
                    failed_modules: vec![Module::Energy]
                }
            }]
        );
    }

    #[test]
    fn test_final_module_failure_before_submission_is_ignored() {
        let snap = snapshot(&[
            ("j1", Module::Terrain, JobStatus::Completed),
            ("j2", Module::Windfields, JobStatus::Completed),
            ("j5", Module::Energy, JobStatus::Failed),
        ]);
        let actions = PipelineStateTracker::decide(&snap, &first_stage_submitted());
        assert_eq!(
            actions,
            vec![Action::SubmitStage {
                stage: Stage::Synthesis
            }]
        );
    }

    #[test]
    fn test_empty_snapshot_is_not_vacuously_satisfied() {
        let snap = StatusSnapshot::default();
        let progress = PipelineProgress::from_snapshot(&snap);
        for stage in Stage::ALL {
            assert!(!progress.stage_satisfied(stage));
        }
        assert!(PipelineStateTracker::decide(&snap, &first_stage_submitted()).is_empty());
    }

    #[test]
    fn test_missing_module_blocks_stage() {
        let snap = snapshot(&[("j1", Module::Terrain, JobStatus::Completed)]);
        let actions = PipelineStateTracker::decide(&snap, &first_stage_submitted());
        assert!(actions.is_empty());
    }

    #[test]
    fn test_resubmission_latest_entry_wins() {
        let snap = snapshot(&[
            ("j1", Module::Terrain, JobStatus::Failed),
            ("j2", Module::Windfields, JobStatus::Completed),
            ("j1b", Module::Terrain, JobStatus::Completed),
        ]);
        let actions = PipelineStateTracker::decide(&snap, &first_stage_submitted());
        assert_eq!(
            actions,
            vec![Action::SubmitStage {
                stage: Stage::Synthesis
            }]
        );

        let regressed = snapshot(&[
            ("j1", Module::Terrain, JobStatus::Completed),
            ("j2", Module::Windfields, JobStatus::Completed),
            ("j1b", Module::Terrain, JobStatus::Created),
        ]);
        assert!(PipelineStateTracker::decide(&regressed, &first_stage_submitted()).is_empty());
    }

    #[test]
    fn test_stage_two_gate_only_when_stage_one_completed() {
        // Exhaustive over the two first-stage module statuses.
        for terrain in JobStatus::ALL {
            for windfields in JobStatus::ALL {
                let snap = snapshot(&[
                    ("j1", Module::Terrain, terrain),
                    ("j2", Module::Windfields, windfields),
                ]);
                let actions = PipelineStateTracker::decide(&snap, &first_stage_submitted());
                let both_done =
                    terrain == JobStatus::Completed && windfields == JobStatus::Completed;
                assert_eq!(!actions.is_empty(), both_done, "{terrain} / {windfields}");
            }
        }
    }

    #[test]
    fn test_progress_display() {
        let snap = snapshot(&[("j1", Module::Terrain, JobStatus::InProgress)]);
        let progress = PipelineProgress::from_snapshot(&snap);
        let shown = progress.to_string();
        assert!(shown.starts_with("terrain=in_progress windfields=-"));
        assert!(shown.ends_with("exports=-"));
    }
}
