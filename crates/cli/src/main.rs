mod cli;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use windrun_core::{
    resolve_config, trigger_channel, validate_config, ArtifactTransfer, ConfigError, FailureReason,
    HostClient, HubConnector, PipelineOrchestrator, PollTrigger, PushTrigger, RetryingGateway,
    RunOutcome, RunParams, SanitizedConfig, StatusSource, SubmissionGateway, Trigger, TriggerMode,
    EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE,
};

use cli::{Cli, LogFormat};

#[tokio::main]
async fn main() {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(args.log_format);

    if let Err(message) = args.check_source() {
        error!("{}", message);
        std::process::exit(EXIT_USAGE);
    }

    let started = Instant::now();
    let code = match run(&args).await {
        Ok(outcome) => {
            info!("Run finished: {}", outcome);
            outcome.exit_code()
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            exit_code_for(&e)
        }
    };

    if let Some(path) = &args.metrics_file {
        metrics::RUN_EXIT_CODE.set(i64::from(code));
        metrics::RUN_DURATION.set(started.elapsed().as_secs_f64());
        if let Err(e) = write_metrics(path) {
            warn!("Failed to write metrics to {:?}: {:#}", path, e);
        }
    }

    std::process::exit(code);
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run(args: &Cli) -> Result<RunOutcome> {
    let mut config = resolve_config(args.config.as_deref()).context("Failed to load config")?;
    args.apply_overrides(&mut config);
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        "Configuration loaded: {}",
        serde_json::to_string(&sanitized).unwrap_or_default()
    );

    let client = Arc::new(
        HostClient::new(config.host.clone(), config.retry.clone())
            .context("Failed to create host client")?,
    );
    let statuses: Arc<dyn StatusSource> = client.clone();
    let transfer: Arc<dyn ArtifactTransfer> = client.clone();
    let gateway: Arc<dyn SubmissionGateway> =
        Arc::new(RetryingGateway::new(Arc::clone(&client), config.retry.clone()));

    let params = RunParams::new(
        args.project_id,
        args.source_path.clone(),
        args.destination_path.clone(),
    );
    let mut orchestrator =
        PipelineOrchestrator::new(params, config.run.clone(), statuses, gateway, transfer);

    let token = match orchestrator.submit_initial_stage().await {
        Ok(token) => token,
        Err(e) if e.is_fatal() => {
            error!("Initial submission failed: {}", e);
            return Ok(RunOutcome::Failed(FailureReason::Fatal(e.to_string())));
        }
        Err(e) => {
            warn!("Initial submission failed, the run loop will retry: {}", e);
            client
                .access_token()
                .await
                .context("Failed to obtain host access token")?
        }
    };

    let trigger = match config.trigger.mode {
        TriggerMode::Poll => Trigger::Poll(
            PollTrigger::new(Duration::from_millis(config.trigger.poll_interval_ms))
                .until(orchestrator.deadline()),
        ),
        TriggerMode::Push => {
            let connector =
                HubConnector::new(config.host.hub_base_url(), args.project_id, token)
                    .context("Failed to configure notification hub")?;
            info!("Subscribing to {}", connector.hub_url());
            Trigger::Push(PushTrigger::new(
                connector,
                Duration::from_millis(config.trigger.reconnect_delay_ms),
            ))
        }
    };
    info!("Using {} trigger", trigger.mode());

    let (handle, wakeups) = trigger_channel();
    let trigger_task = trigger.spawn(handle, orchestrator.subscribe_shutdown());

    let outcome = orchestrator.run(wakeups).await;

    if let Err(e) = trigger_task.await {
        warn!("Trigger task ended abnormally: {}", e);
    }

    Ok(outcome)
}

/// A missing config file or invalid settings is a usage error.
fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ConfigError>() {
        Some(ConfigError::FileNotFound(_)) | Some(ConfigError::ValidationError(_)) => EXIT_USAGE,
        _ => EXIT_FAILURE,
    }
}

fn write_metrics(path: &std::path::Path) -> Result<()> {
    let text = metrics::encode_metrics().context("Failed to encode metrics")?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}
