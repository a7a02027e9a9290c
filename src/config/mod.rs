//! Client configuration
//!
//! Resolved in three layers:
//! 1. Built-in defaults
//! 2. Config file (`--config`, else `~/.config/hpcjob/config.toml` if present)
//! 3. CLI flags (`--server`, `--identity-dir`)

pub mod defaults;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::host::HttpConfig;
use crate::job::TokenSettings;
use crate::token::DigestAlgorithm;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service base URL
    pub server_url: String,

    /// Directory of identity files
    pub identity_dir: PathBuf,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Executable archive size limit in bytes (0 = unlimited)
    pub max_bundle_bytes: u64,

    pub token: TokenConfig,

    pub poll: PollConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: defaults::SERVER_URL.to_string(),
            identity_dir: PathBuf::from(defaults::IDENTITY_DIR),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            max_bundle_bytes: defaults::MAX_BUNDLE_BYTES,
            token: TokenConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

/// Access token settings (`[token]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub algorithm: DigestAlgorithm,
    pub freshness_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::default(),
            freshness_secs: defaults::TOKEN_FRESHNESS_SECS,
        }
    }
}

/// Live watch refresh intervals (`[poll]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub events_interval_secs: u64,
    pub logs_interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            events_interval_secs: defaults::EVENTS_INTERVAL_SECS,
            logs_interval_secs: defaults::LOGS_INTERVAL_SECS,
        }
    }
}

/// Command-line overrides (layer 3)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub server_url: Option<String>,
    pub identity_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Parse configuration from TOML
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Default config file path (`$HOME/.config/hpcjob/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(defaults::CONFIG_RELATIVE_PATH))
    }

    /// Resolve defaults, file and CLI overrides into one validated config
    ///
    /// An explicit `config_path` must exist; the default path is used only
    /// when present.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match &overrides.config_path {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };

        if let Some(url) = &overrides.server_url {
            config.server_url = url.clone();
        }
        if let Some(dir) = &overrides.identity_dir {
            config.identity_dir = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate field ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "server_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > defaults::MAX_REQUEST_TIMEOUT_SECS {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: format!(
                    "{} is outside 1..={}",
                    self.request_timeout_secs,
                    defaults::MAX_REQUEST_TIMEOUT_SECS
                ),
            });
        }
        if self.token.freshness_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "token.freshness_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.server_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            algorithm: self.token.algorithm,
            freshness_secs: self.token.freshness_secs,
        }
    }

    pub fn events_interval(&self) -> Duration {
        Duration::from_secs(self.poll.events_interval_secs)
    }

    pub fn logs_interval(&self) -> Duration {
        Duration::from_secs(self.poll.logs_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://localhost:3030");
        assert_eq!(config.identity_dir, PathBuf::from("."));
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.max_bundle_bytes, 0);
        assert_eq!(config.token.algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.token.freshness_secs, 3600);
        assert_eq!(config.events_interval(), Duration::from_secs(10));
        assert_eq!(config.logs_interval(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial() {
        let config = ClientConfig::parse(
            r#"
server_url = "https://compute.example.org"

[token]
algorithm = "sha512"

[poll]
logs_interval_secs = 5
"#,
        )
        .unwrap();

        assert_eq!(config.server_url, "https://compute.example.org");
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.token.algorithm, DigestAlgorithm::Sha512);
        assert_eq!(config.token.freshness_secs, 3600);
        assert_eq!(config.poll.events_interval_secs, 10);
        assert_eq!(config.poll.logs_interval_secs, 5);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ClientConfig::parse("").unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(matches!(ClientConfig::parse("server_url = "), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let result = ClientConfig::parse("[token]\nalgorithm = \"md4\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = ClientConfig::default();
        config.server_url = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "server_url", .. })
        ));

        let mut config = ClientConfig::default();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.request_timeout_secs = 3601;
        assert!(config.validate().is_err());
        config.request_timeout_secs = 3600;
        assert!(config.validate().is_ok());

        let mut config = ClientConfig::default();
        config.token.freshness_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "token.freshness_secs", .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(matches!(ClientConfig::load(&path), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_resolve_file_then_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "server_url = \"http://file:1\"\nidentity_dir = \"/from/file\"\nrequest_timeout_secs = 5\n",
        )
        .unwrap();

        let config = ClientConfig::resolve(&ConfigOverrides {
            config_path: Some(path.clone()),
            server_url: Some("http://flag:2".to_string()),
            identity_dir: None,
        })
        .unwrap();

        assert_eq!(config.server_url, "http://flag:2");
        assert_eq!(config.identity_dir, PathBuf::from("/from/file"));
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.http_config().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_resolve_explicit_missing_file() {
        let result = ClientConfig::resolve(&ConfigOverrides {
            config_path: Some(PathBuf::from("/nonexistent/hpcjob.toml")),
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
