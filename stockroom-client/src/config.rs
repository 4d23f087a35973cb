//! Configuration loading for the Stockroom client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use stockroom_core::DateRange;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    /// GraphQL endpoint of the inventory service.
    pub api_url: String,
    pub request_timeout_ms: u64,
    /// One of `7d`, `14d`, `30d`.
    pub default_date_range: String,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or STOCKROOM_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl DashboardConfig {
    /// Load and validate the config at `path`, or at `STOCKROOM_CONFIG`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(config_path_from_env)
            .ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api_url",
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        self.date_range()?;
        if let Some(key) = &self.auth.api_key {
            if key.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "auth.api_key",
                    reason: "must not be blank when present".to_string(),
                });
            }
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// The parsed `default_date_range`.
    pub fn date_range(&self) -> Result<DateRange, ConfigError> {
        self.default_date_range
            .parse()
            .map_err(|err: stockroom_core::ValidationError| ConfigError::InvalidValue {
                field: "default_date_range",
                reason: err.to_string(),
            })
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("STOCKROOM_CONFIG").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
api_url = "https://inventory.example.com/graphql"
request_timeout_ms = 5000
default_date_range = "14d"

[auth]
api_key = "secret"

[logging]
filter = "stockroom=info"
json = false
"#;

    #[test]
    fn test_parse_sample() {
        let config = DashboardConfig::from_toml(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.date_range().unwrap(), DateRange::Last14Days);
        assert_eq!(config.auth.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let contents = format!("retries = 3\n{}", SAMPLE);
        assert!(matches!(
            DashboardConfig::from_toml(&contents),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockroom.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = DashboardConfig::from_path(&path).unwrap();
        assert_eq!(config.request_timeout_ms, 5000);
    }

    #[test]
    fn test_load_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockroom.toml");
        std::fs::write(&path, SAMPLE.replace("14d", "90d")).unwrap();
        assert!(matches!(
            DashboardConfig::load(Some(&path)),
            Err(ConfigError::InvalidValue {
                field: "default_date_range",
                ..
            })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = DashboardConfig::from_path(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
