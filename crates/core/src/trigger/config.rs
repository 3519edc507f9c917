//! Trigger configuration.

use serde::{Deserialize, Serialize};

/// Which adapter wakes the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Fixed-interval wake-ups.
    #[default]
    Poll,
    /// Notification hub subscription.
    Push,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Poll => "poll",
            TriggerMode::Push => "push",
        }
    }
}

impl std::fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "poll" => Ok(TriggerMode::Poll),
            "push" => Ok(TriggerMode::Push),
            other => Err(format!("unknown trigger mode '{}' (expected poll or push)", other)),
        }
    }
}

/// Trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub mode: TriggerMode,

    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Delay before resubscribing to the hub after a disconnect, in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_reconnect_delay() -> u64 {
    2000
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::default(),
            poll_interval_ms: default_poll_interval(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: TriggerConfig = toml::from_str("").unwrap();
        assert_eq!(config.mode, TriggerMode::Poll);
        assert_eq!(config.poll_interval_ms, 3000);
        assert_eq!(config.reconnect_delay_ms, 2000);
    }

    #[test]
    fn test_mode_parsing() {
        let config: TriggerConfig = toml::from_str(r#"mode = "push""#).unwrap();
        assert_eq!(config.mode, TriggerMode::Push);
        assert_eq!("PUSH".parse::<TriggerMode>().unwrap(), TriggerMode::Push);
        assert!("webhook".parse::<TriggerMode>().is_err());
    }
}
