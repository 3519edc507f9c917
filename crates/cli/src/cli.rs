//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use uuid::Uuid;

use windrun_core::{Config, TriggerMode};

/// Drive a project through the three simulation stages on the host.
#[derive(Debug, Parser)]
#[command(name = "windrun", version, about)]
pub struct Cli {
    /// Project identifier on the host.
    pub project_id: Uuid,

    /// Local artifact staged as every stage's input.
    pub source_path: PathBuf,

    /// Directory the pipeline output is downloaded into.
    pub destination_path: PathBuf,

    /// Configuration file (TOML). Defaults to ./windrun.toml when present.
    #[arg(long, env = "WINDRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the trigger mode.
    #[arg(long, value_enum)]
    pub trigger: Option<TriggerArg>,

    /// Override the run deadline, in seconds.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Write Prometheus text metrics to this file when the run ends.
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerArg {
    Poll,
    Push,
}

impl From<TriggerArg> for TriggerMode {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Poll => TriggerMode::Poll,
            TriggerArg::Push => TriggerMode::Push,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    /// Apply flag overrides on top of file/env configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(trigger) = self.trigger {
            config.trigger.mode = trigger.into();
        }
        if let Some(deadline) = self.deadline_secs {
            config.run.deadline_secs = deadline;
        }
    }

    /// The source artifact must exist before anything is sent to the host.
    pub fn check_source(&self) -> Result<(), String> {
        if self.source_path.is_file() {
            Ok(())
        } else {
            Err(format!(
                "source artifact {:?} does not exist or is not a file",
                self.source_path
            ))
        }
    }
}
