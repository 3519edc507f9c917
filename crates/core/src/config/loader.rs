use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment overrides, e.g. `WINDRUN_HOST_BASE_URL`.
pub const ENV_PREFIX: &str = "WINDRUN_";

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "windrun.toml";

/// Map `HOST_BASE_URL` to `host.base_url`: the first segment is the section.
fn env_key(key: &str) -> String {
    key.replacen('_', ".", 1)
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX)
        .ignore(&["CONFIG"])
        .map(|key| env_key(key.as_str()).into())
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from environment variables only
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::new()
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load from `path` if given, else `windrun.toml` if present, else the
/// environment alone.
pub fn resolve_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                load_config(default)
            } else {
                load_config_from_env()
            }
        }
    }
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[host]
base_url = "https://sim.example.net/"

[trigger]
mode = "push"
poll_interval_ms = 1000
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.host.base_url, "https://sim.example.net/");
        assert_eq!(config.trigger.poll_interval_ms, 1000);
    }

    #[test]
    fn test_load_config_from_str_missing_host() {
        let toml = r#"
[retry]
max_retries = 3
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/windrun.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
        let result = resolve_config(Some(Path::new("/nonexistent/windrun.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[host]
base_url = "https://sim.example.net/"
username = "ops@example.net"
password = "secret"

[run]
deadline_secs = 900
settle_delay_ms = 0
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.host.username, "ops@example.net");
        assert_eq!(config.run.deadline_secs, 900);
        assert_eq!(config.run.settle_delay_ms, 0);
    }

    #[test]
    fn test_env_key_mapping() {
        assert_eq!(env_key("HOST_BASE_URL"), "HOST.BASE_URL");
        assert_eq!(env_key("retry_max_retries"), "retry.max_retries");
        assert_eq!(env_key("TRIGGER_MODE"), "TRIGGER.MODE");
    }
}
