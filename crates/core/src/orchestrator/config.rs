//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Overall deadline in seconds, measured from orchestrator creation.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Pause between the first submission and the first turn (milliseconds).
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Where stage inputs are staged before upload.
    /// Defaults to the source artifact's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

fn default_deadline() -> u64 {
    14400 // 4 hours
}

fn default_settle_delay() -> u64 {
    1800
}

/// Longest accepted run deadline (30 days).
pub const MAX_DEADLINE_SECS: u64 = 30 * 24 * 60 * 60;

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline(),
            settle_delay_ms: default_settle_delay(),
            staging_dir: None,
        }
    }
}

impl RunConfig {
    /// Run deadline, capped at [`MAX_DEADLINE_SECS`].
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs.min(MAX_DEADLINE_SECS))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.deadline(), Duration::from_secs(4 * 60 * 60));
        assert_eq!(config.settle_delay(), Duration::from_millis(1800));
        assert!(config.staging_dir.is_none());
    }

    #[test]
    fn test_deadline_is_capped() {
        let config = RunConfig {
            deadline_secs: u64::MAX,
            ..RunConfig::default()
        };
        assert_eq!(config.deadline(), Duration::from_secs(MAX_DEADLINE_SECS));
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            deadline_secs = 600
            staging_dir = "/var/tmp/windrun"
        "#;
        let config: RunConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.deadline_secs, 600);
        assert_eq!(config.settle_delay_ms, 1800);
        assert_eq!(config.staging_dir, Some(PathBuf::from("/var/tmp/windrun")));
    }
}
