//! Types describing the simulation pipeline: modules, job statuses,
//! status snapshots and the three fixed stages.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// A value that could not be mapped to one of a closed set of variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Host enums arrive either as names or as zero-based ordinals,
/// depending on the serializer settings of the service.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireEnum {
    Ordinal(u64),
    Name(String),
}

/// Lowercase and strip separators so `WindResources`, `wind_resources`
/// and `wind-resources` all compare equal.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// A computational unit within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Terrain,
    Windfields,
    Objects,
    WindResources,
    Loads,
    Energy,
    Exports,
}

impl Module {
    /// All modules in wire ordinal order.
    pub const ALL: [Module; 7] = [
        Module::Terrain,
        Module::Windfields,
        Module::Objects,
        Module::WindResources,
        Module::Loads,
        Module::Energy,
        Module::Exports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Terrain => "terrain",
            Module::Windfields => "windfields",
            Module::Objects => "objects",
            Module::WindResources => "wind_resources",
            Module::Loads => "loads",
            Module::Energy => "energy",
            Module::Exports => "exports",
        }
    }

    /// The stage this module belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Module::Terrain | Module::Windfields => Stage::CfdRans,
            Module::Objects | Module::WindResources => Stage::Synthesis,
            Module::Loads | Module::Energy | Module::Exports => Stage::Aep,
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Module::ALL
            .into_iter()
            .find(|m| normalize(m.as_str()) == wanted)
            .ok_or_else(|| UnknownVariant {
                kind: "module",
                value: s.to_string(),
            })
    }
}

impl<'de> Deserialize<'de> for Module {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match WireEnum::deserialize(deserializer)? {
            WireEnum::Ordinal(n) => usize::try_from(n)
                .ok()
                .and_then(|idx| Module::ALL.get(idx).copied())
                .ok_or_else(|| de::Error::custom(format!("unknown module ordinal: {}", n))),
            WireEnum::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}

/// Status of a single job on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// All statuses in wire ordinal order.
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Created,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        JobStatus::ALL
            .into_iter()
            .find(|st| normalize(st.as_str()) == wanted)
            .ok_or_else(|| UnknownVariant {
                kind: "job status",
                value: s.to_string(),
            })
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match WireEnum::deserialize(deserializer)? {
            WireEnum::Ordinal(n) => usize::try_from(n)
                .ok()
                .and_then(|idx| JobStatus::ALL.get(idx).copied())
                .ok_or_else(|| de::Error::custom(format!("unknown job status ordinal: {}", n))),
            WireEnum::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}

/// One `(jobId, module, status)` triple as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusEntry {
    pub job_id: String,
    pub module: Module,
    pub status: JobStatus,
}

impl JobStatusEntry {
    pub fn new(job_id: impl Into<String>, module: Module, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            module,
            status,
        }
    }
}

/// Statuses of every job of a project, captured at one instant.
///
/// Entry order is fetch order. A module may appear several times when the
/// host resubmitted its job; later entries are the more recent observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    entries: Vec<JobStatusEntry>,
}

impl StatusSnapshot {
    pub fn new(entries: Vec<JobStatusEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[JobStatusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest observed status per module; later entries win.
    pub fn latest_statuses(&self) -> BTreeMap<Module, JobStatus> {
        let mut latest = BTreeMap::new();
        for entry in &self.entries {
            latest.insert(entry.module, entry.status);
        }
        latest
    }
}

impl FromIterator<JobStatusEntry> for StatusSnapshot {
    fn from_iter<I: IntoIterator<Item = JobStatusEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

static STAGE_ORDER: [Stage; 3] = Stage::ALL;

/// The three ordered phases of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// First stage: CFD RANS wind field computation.
    CfdRans,
    /// Second stage: wind resource synthesis.
    Synthesis,
    /// Third and final stage: annual energy production.
    Aep,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::CfdRans, Stage::Synthesis, Stage::Aep];

    /// The stage whose completion ends the run.
    pub const FINAL: Stage = Stage::Aep;

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CfdRans => "cfd_rans",
            Stage::Synthesis => "synthesis",
            Stage::Aep => "aep",
        }
    }

    /// One-based position in the pipeline.
    pub fn ordinal(&self) -> usize {
        match self {
            Stage::CfdRans => 1,
            Stage::Synthesis => 2,
            Stage::Aep => 3,
        }
    }

    pub fn required_modules(&self) -> &'static [Module] {
        match self {
            Stage::CfdRans => &[Module::Terrain, Module::Windfields],
            Stage::Synthesis => &[Module::Objects, Module::WindResources],
            Stage::Aep => &[Module::Loads, Module::Energy, Module::Exports],
        }
    }

    /// Stages strictly before this one, in order.
    pub fn predecessors(&self) -> &'static [Stage] {
        &STAGE_ORDER[..self.ordinal() - 1]
    }

    /// This stage and every stage before it, in order.
    pub fn up_to(&self) -> &'static [Stage] {
        &STAGE_ORDER[..self.ordinal()]
    }

    /// File name the stage input is staged under before upload.
    pub fn input_artifact_name(&self) -> &'static str {
        match self {
            Stage::CfdRans => "cfdrans-input.zip",
            Stage::Synthesis => "synthesis-input.zip",
            Stage::Aep => "aep-input.zip",
        }
    }

    pub fn is_final(&self) -> bool {
        *self == Stage::FINAL
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission state of a stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    #[default]
    Pending,
    Submitted,
}

/// Per-stage submission state. Transitions are one-way: a submitted stage
/// never returns to pending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageStates {
    states: [StageState; 3],
}

impl StageStates {
    /// All stages pending.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: Stage) -> StageState {
        self.states[stage.ordinal() - 1]
    }

    pub fn is_submitted(&self, stage: Stage) -> bool {
        self.get(stage) == StageState::Submitted
    }

    /// Mark a stage submitted. Returns `false` if it already was.
    pub fn mark_submitted(&mut self, stage: Stage) -> bool {
        let slot = &mut self.states[stage.ordinal() - 1];
        if *slot == StageState::Submitted {
            return false;
        }
        *slot = StageState::Submitted;
        true
    }

    /// First stage, in pipeline order, that has not been submitted yet.
    pub fn first_pending(&self) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| !self.is_submitted(*s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_parse_names() {
        assert_eq!("Terrain".parse::<Module>().unwrap(), Module::Terrain);
        assert_eq!("WindResources".parse::<Module>().unwrap(), Module::WindResources);
        assert_eq!("wind_resources".parse::<Module>().unwrap(), Module::WindResources);
        assert_eq!("EXPORTS".parse::<Module>().unwrap(), Module::Exports);
        assert!("Turbines".parse::<Module>().is_err());
    }

    #[test]
    fn test_module_deserialize_name_or_ordinal() {
        let by_name: Module = serde_json::from_str(r#""Windfields""#).unwrap();
        assert_eq!(by_name, Module::Windfields);

        let by_ordinal: Module = serde_json::from_str("5").unwrap();
        assert_eq!(by_ordinal, Module::Energy);

        let out_of_range: Result<Module, _> = serde_json::from_str("7");
        assert!(out_of_range.is_err());
    }

    #[test]
    fn test_job_status_deserialize() {
        let s: JobStatus = serde_json::from_str(r#""InProgress""#).unwrap();
        assert_eq!(s, JobStatus::InProgress);
        let s: JobStatus = serde_json::from_str(r#""in_progress""#).unwrap();
        assert_eq!(s, JobStatus::InProgress);
        let s: JobStatus = serde_json::from_str("3").unwrap();
        assert_eq!(s, JobStatus::Failed);
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Created.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_entry_deserialize_camel_case() {
        let json = r#"{"jobId":"a1","module":"Objects","status":"Completed"}"#;
        let entry: JobStatusEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry, JobStatusEntry::new("a1", Module::Objects, JobStatus::Completed));
    }

    #[test]
    fn test_latest_status_wins() {
        let snapshot = StatusSnapshot::new(vec![
            JobStatusEntry::new("j1", Module::Terrain, JobStatus::Failed),
            JobStatusEntry::new("j2", Module::Windfields, JobStatus::Completed),
            JobStatusEntry::new("j3", Module::Terrain, JobStatus::InProgress),
        ]);
        let latest = snapshot.latest_statuses();
        assert_eq!(latest.get(&Module::Terrain), Some(&JobStatus::InProgress));
        assert_eq!(latest.get(&Module::Windfields), Some(&JobStatus::Completed));
        assert_eq!(latest.get(&Module::Loads), None);
    }

    #[test]
    fn test_module_stage_mapping_matches_required_modules() {
        for stage in Stage::ALL {
            for module in stage.required_modules() {
                assert_eq!(module.stage(), stage);
            }
        }
    }

    #[test]
    fn test_stage_ordering_helpers() {
        assert!(Stage::CfdRans.predecessors().is_empty());
        assert_eq!(Stage::Aep.predecessors(), &[Stage::CfdRans, Stage::Synthesis]);
        assert_eq!(Stage::Synthesis.up_to(), &[Stage::CfdRans, Stage::Synthesis]);
        assert!(Stage::Aep.is_final());
        assert!(!Stage::Synthesis.is_final());
    }

    #[test]
    fn test_stage_states_are_monotonic() {
        let mut states = StageStates::new();
        assert_eq!(states.first_pending(), Some(Stage::CfdRans));

        assert!(states.mark_submitted(Stage::CfdRans));
        assert!(!states.mark_submitted(Stage::CfdRans));
        assert!(states.is_submitted(Stage::CfdRans));
        assert_eq!(states.first_pending(), Some(Stage::Synthesis));

        states.mark_submitted(Stage::Synthesis);
        states.mark_submitted(Stage::Aep);
        assert_eq!(states.first_pending(), None);
    }
}
