//! Pipeline orchestrator implementation.
//!
//! Owns the run state and performs reconciliation turns strictly one at a
//! time: the run loop is the only reader of the wake-up channel.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::host::{AccessToken, ArtifactTransfer, StatusSource, SubmissionGateway};
use crate::metrics;
use crate::pipeline::{
    Action, PipelineProgress, PipelineStateTracker, Stage, StageState, StageStates, Termination,
};
use crate::trigger::Wakeup;

use super::config::RunConfig;
use super::types::{
    FailureReason, OrchestratorError, RunOutcome, RunParams, RunPhase, TurnOutcome,
};

/// Drives one project through the three pipeline stages.
pub struct PipelineOrchestrator {
    params: RunParams,
    config: RunConfig,
    statuses: Arc<dyn StatusSource>,
    gateway: Arc<dyn SubmissionGateway>,
    transfer: Arc<dyn ArtifactTransfer>,

    // Run state
    stages: StageStates,
    phase: RunPhase,
    deadline: Instant,
    turns: u64,
    shutdown_tx: broadcast::Sender<()>,
}

impl PipelineOrchestrator {
    /// Create an orchestrator. The deadline starts counting now.
    pub fn new(
        params: RunParams,
        config: RunConfig,
        statuses: Arc<dyn StatusSource>,
        gateway: Arc<dyn SubmissionGateway>,
        transfer: Arc<dyn ArtifactTransfer>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let deadline = Instant::now() + config.deadline();

        Self {
            params,
            config,
            statuses,
            gateway,
            transfer,
            stages: StageStates::new(),
            phase: RunPhase::Idle,
            deadline,
            turns: 0,
            shutdown_tx,
        }
    }

    /// Receiver that fires once the run terminates. Triggers stop on it.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn stage_state(&self, stage: Stage) -> StageState {
        self.stages.get(stage)
    }

    /// Turns performed so far.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Stage, upload and submit the first stage. Returns the host token.
    pub async fn submit_initial_stage(&mut self) -> Result<AccessToken, OrchestratorError> {
        self.enact_submission(Stage::CfdRans).await
    }

    /// Run until a terminal outcome, then signal shutdown.
    ///
    /// One turn happens after the settle delay; every further turn is
    /// requested through `wakeups`. The deadline is checked between turns
    /// and also wakes the loop on its own.
    pub async fn run(&mut self, mut wakeups: mpsc::Receiver<Wakeup>) -> RunOutcome {
        info!(
            "Run started for project {} (deadline in {:?})",
            self.params.project_id,
            self.deadline.saturating_duration_since(Instant::now())
        );

        let settle_until = (Instant::now() + self.config.settle_delay()).min(self.deadline);
        tokio::time::sleep_until(settle_until).await;

        let outcome = loop {
            if Instant::now() >= self.deadline {
                break RunOutcome::Failed(FailureReason::DeadlineExceeded);
            }

            if let Some(outcome) = self.turn().await {
                break outcome;
            }

            tokio::select! {
                biased;
                _ = tokio::time::sleep_until(self.deadline) => {
                    break RunOutcome::Failed(FailureReason::DeadlineExceeded);
                }
                wakeup = wakeups.recv() => match wakeup {
                    Some(wakeup) => {
                        debug!("Woken by {} trigger", wakeup.source.as_str());
                    }
                    None if Instant::now() >= self.deadline => {
                        break RunOutcome::Failed(FailureReason::DeadlineExceeded);
                    }
                    None => {
                        warn!("Wake-up channel closed before the run finished");
                        break RunOutcome::Failed(FailureReason::TriggersClosed);
                    }
                },
            }
        };

        self.finish(outcome)
    }

    /// Perform a single reconciliation turn.
    pub async fn reconcile_once(&mut self) -> Result<TurnOutcome, OrchestratorError> {
        self.turns += 1;

        let snapshot = self.statuses.fetch_statuses(self.params.project_id).await?;
        for entry in snapshot.entries() {
            debug!(
                "job {} module {} status {}",
                entry.job_id, entry.module, entry.status
            );
        }

        let progress = PipelineProgress::from_snapshot(&snapshot);
        info!("Turn {}: {}", self.turns, progress);

        let actions = PipelineStateTracker::decide_from_progress(&progress, &self.stages);
        if let Some(action) = actions.into_iter().next() {
            return match action {
                Action::Terminate { termination } => self.terminate(termination).await,
                Action::SubmitStage { stage } => {
                    self.enact_submission(stage).await?;
                    Ok(TurnOutcome::Submitted(stage))
                }
            };
        }

        Ok(TurnOutcome::Idle)
    }

    /// Run one turn and classify its result. `Some` ends the run.
    async fn turn(&mut self) -> Option<RunOutcome> {
        self.phase = RunPhase::Reconciling;
        let result = self.reconcile_once().await;
        self.phase = RunPhase::Idle;

        match result {
            Ok(outcome) => {
                metrics::RECONCILE_TURNS
                    .with_label_values(&[outcome.label()])
                    .inc();
                match outcome {
                    TurnOutcome::Terminated(outcome) => Some(outcome),
                    TurnOutcome::Idle | TurnOutcome::Submitted(_) => None,
                }
            }
            Err(e) => {
                metrics::RECONCILE_TURNS.with_label_values(&["error"]).inc();
                if e.is_fatal() {
                    error!("Turn {} failed fatally: {}", self.turns, e);
                    Some(RunOutcome::Failed(FailureReason::Fatal(e.to_string())))
                } else {
                    warn!("Turn {} aborted: {}", self.turns, e);
                    None
                }
            }
        }
    }

    async fn terminate(&mut self, termination: Termination) -> Result<TurnOutcome, OrchestratorError> {
        match termination {
            Termination::Success => {
                info!("Final stage completed, downloading output");
                let output = self.download_output().await?;
                Ok(TurnOutcome::Terminated(RunOutcome::Succeeded { output }))
            }
            Termination::Failure { failed_modules } => {
                let reason = FailureReason::ModuleFailed(failed_modules);
                error!("Pipeline failed: {}", reason);
                if let Err(e) = self.download_output().await {
                    warn!("Best-effort output download failed: {}", e);
                }
                Ok(TurnOutcome::Terminated(RunOutcome::Failed(reason)))
            }
        }
    }

    /// Stage, upload, submit, then mark the stage submitted. Any failure
    /// leaves the stage pending so a later turn retries it.
    async fn enact_submission(&mut self, stage: Stage) -> Result<AccessToken, OrchestratorError> {
        if self.stages.is_submitted(stage) {
            return Err(OrchestratorError::InvalidState(format!(
                "{} stage already submitted",
                stage
            )));
        }

        let result = self.upload_and_submit(stage).await;
        let label = if result.is_ok() { "submitted" } else { "failed" };
        metrics::STAGE_SUBMISSIONS
            .with_label_values(&[stage.as_str(), label])
            .inc();
        let token = result?;

        if !self.stages.mark_submitted(stage) {
            return Err(OrchestratorError::InvalidState(format!(
                "{} stage submitted twice",
                stage
            )));
        }
        info!("Stage {} ({}) submitted", stage.ordinal(), stage);
        Ok(token)
    }

    async fn upload_and_submit(&self, stage: Stage) -> Result<AccessToken, OrchestratorError> {
        let project_id = self.params.project_id;
        let staged = self.stage_input(stage).await?;

        let uri = self.transfer.input_upload_uri(stage, project_id).await?;
        self.transfer.upload(&uri, &staged).await?;
        debug!("Uploaded {} input {:?}", stage, staged);

        Ok(self.gateway.submit(stage, project_id).await?)
    }

    /// Copy the source artifact to the stage's input name.
    async fn stage_input(&self, stage: Stage) -> Result<PathBuf, OrchestratorError> {
        let dir = self.params.staging_dir(&self.config);
        let target = dir.join(stage.input_artifact_name());
        let staging_error = |path: &PathBuf, source| OrchestratorError::Staging {
            stage,
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| staging_error(&dir, e))?;

        if target != self.params.source_path {
            tokio::fs::copy(&self.params.source_path, &target)
                .await
                .map_err(|e| staging_error(&self.params.source_path, e))?;
        }
        Ok(target)
    }

    async fn download_output(&self) -> Result<PathBuf, OrchestratorError> {
        let uri = self
            .transfer
            .output_download_uri(self.params.project_id)
            .await?;
        let output = self
            .transfer
            .download(&uri, &self.params.destination_path)
            .await?;
        info!("Output downloaded to {:?}", output);
        Ok(output)
    }

    fn finish(&mut self, outcome: RunOutcome) -> RunOutcome {
        self.phase = RunPhase::Terminated;
        let _ = self.shutdown_tx.send(());

        match &outcome {
            RunOutcome::Succeeded { .. } => info!("Run {} after {} turns", outcome, self.turns),
            RunOutcome::Failed(_) => error!("Run {} after {} turns", outcome, self.turns),
        }
        outcome
    }
}
