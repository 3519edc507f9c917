pub mod config;
pub mod host;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod testing;
pub mod trigger;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, resolve_config, validate_config,
    Config, ConfigError, SanitizedConfig,
};
pub use host::{
    AccessToken, ArtifactTransfer, HostClient, HostConfig, HostError, JobSubmitter, StatusSource,
    SubmissionGateway,
};
pub use orchestrator::{
    FailureReason, OrchestratorError, PipelineOrchestrator, RunConfig, RunOutcome, RunParams,
    RunPhase, TurnOutcome, EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE, MAX_DEADLINE_SECS,
};
pub use pipeline::{
    Action, JobStatus, JobStatusEntry, Module, PipelineProgress, PipelineStateTracker, Stage,
    StageState, StageStates, StatusSnapshot, Termination,
};
pub use retry::{retry_transient, BackoffStrategy, RetryConfig, RetryingGateway};
pub use trigger::{
    trigger_channel, HubConnector, PollTrigger, PushTrigger, Trigger, TriggerConfig,
    TriggerHandle, TriggerMode, WakeResult, Wakeup, WakeupSource,
};
