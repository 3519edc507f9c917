//! Host connection configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for the simulation host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Base URL of the host API (e.g., "https://sim.example.net/").
    pub base_url: String,

    /// Base URL of the notification hub. Defaults to `base_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub_url: Option<String>,

    /// Login e-mail.
    #[serde(default)]
    pub username: String,

    /// Login password.
    #[serde(default)]
    pub password: String,

    /// Request timeout in seconds. Stage uploads can be large.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    1200 // 20 minutes
}

impl HostConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            hub_url: None,
            username: String::new(),
            password: String::new(),
            timeout_secs: default_timeout(),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Hub base URL, falling back to the API base URL.
    pub fn hub_base_url(&self) -> &str {
        self.hub_url.as_deref().unwrap_or(&self.base_url)
    }
}
