use serde::{Deserialize, Serialize};

use crate::host::HostConfig;
use crate::orchestrator::RunConfig;
use crate::retry::RetryConfig;
use crate::trigger::TriggerConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub host: HostConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    pub fn new(host: HostConfig) -> Self {
        Self {
            host,
            run: RunConfig::default(),
            trigger: TriggerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub host: SanitizedHostConfig,
    pub run: RunConfig,
    pub trigger: TriggerConfig,
    pub retry: RetryConfig,
}

/// Sanitized host config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedHostConfig {
    pub base_url: String,
    pub hub_url: String,
    pub username: String,
    pub password_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            host: SanitizedHostConfig {
                base_url: config.host.base_url.clone(),
                hub_url: config.host.hub_base_url().to_string(),
                username: config.host.username.clone(),
                password_configured: !config.host.password.is_empty(),
                timeout_secs: config.host.timeout_secs,
            },
            run: config.run.clone(),
            trigger: config.trigger.clone(),
            retry: config.retry.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerMode;

    #[test]
    fn test_missing_host_section_fails() {
        let toml = r#"
[run]
deadline_secs = 60
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let toml = r#"
[host]
base_url = "https://sim.example.net/"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.run.deadline_secs, 14400);
        assert_eq!(config.trigger.mode, TriggerMode::Poll);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn test_sanitized_config_hides_password() {
        let config = Config::new(
            HostConfig::new("https://sim.example.net/").with_credentials("ops@example.net", "hunter2"),
        );
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.host.password_configured);
        assert_eq!(sanitized.host.hub_url, "https://sim.example.net/");

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("ops@example.net"));
    }
}
