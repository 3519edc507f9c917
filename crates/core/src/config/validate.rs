use super::{types::Config, ConfigError};
use crate::orchestrator::MAX_DEADLINE_SECS;

/// Validate configuration
/// Currently validates:
/// - Host base URL is set and parses
/// - Deadline is non-zero and at most `MAX_DEADLINE_SECS`
/// - Poll interval and reconnect delay are non-zero
/// - Retry multiplier is at least 1.0 and initial delay <= max delay
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Host validation
    let base_url = config.host.base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "host.base_url cannot be empty".to_string(),
        ));
    }
    if reqwest::Url::parse(base_url).is_err() {
        return Err(ConfigError::ValidationError(format!(
            "host.base_url is not a valid URL: {}",
            base_url
        )));
    }

    // Run validation
    if config.run.deadline_secs == 0 {
        return Err(ConfigError::ValidationError(
            "run.deadline_secs cannot be 0".to_string(),
        ));
    }
    if config.run.deadline_secs > MAX_DEADLINE_SECS {
        return Err(ConfigError::ValidationError(format!(
            "run.deadline_secs cannot exceed {}",
            MAX_DEADLINE_SECS
        )));
    }

    // Trigger validation
    if config.trigger.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "trigger.poll_interval_ms cannot be 0".to_string(),
        ));
    }
    if config.trigger.reconnect_delay_ms == 0 {
        return Err(ConfigError::ValidationError(
            "trigger.reconnect_delay_ms cannot be 0".to_string(),
        ));
    }

    // Retry validation
    if config.retry.multiplier.is_nan() || config.retry.multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "retry.multiplier must be at least 1.0".to_string(),
        ));
    }
    if config.retry.initial_delay_ms > config.retry.max_delay_ms {
        return Err(ConfigError::ValidationError(
            "retry.initial_delay_ms cannot exceed retry.max_delay_ms".to_string(),
        ));
    }

    Ok(())
}
