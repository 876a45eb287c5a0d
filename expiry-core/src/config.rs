//! Probe targets and remote-store credentials loaded from YAML.

use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// A configured probe target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Domain {
    pub name: String,
    /// WHOIS server to query for this domain.
    #[serde(default)]
    pub host: Option<String>,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{} (via {})", self.name, host),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct RemoteStoreConfig {
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

impl fmt::Debug for RemoteStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStoreConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub domains: Vec<Domain>,

    #[serde(alias = "remoteStore", alias = "prometheus")]
    pub remote_store: RemoteStoreConfig,
}

impl Config {
    /// Load, expand `${VAR}` references, parse and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(raw);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domains.is_empty() {
            return Err(ConfigError::ValidationError(
                "no domains to probe: config must contain at least one domain".to_string(),
            ));
        }

        if let Some(pos) = self.domains.iter().position(|d| d.name.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "domain #{} has an empty name",
                pos + 1
            )));
        }

        let store = &self.remote_store;
        if store.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "remote_store.url must be set".to_string(),
            ));
        }
        reqwest::Url::parse(&store.url).map_err(|e| {
            ConfigError::ValidationError(format!("remote_store.url is invalid: {}", e))
        })?;

        if store.user.is_empty() || store.pass.is_empty() {
            return Err(ConfigError::ValidationError(
                "remote_store.user and remote_store.pass must be set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand environment variables in a string.
/// Supports ${VAR} and ${VAR:-default} syntax.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    ENV_VAR_REGEX
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}
