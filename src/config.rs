//! Configuration management for the Beam node clients
//!
//! Endpoints can be built in code or loaded from a YAML/JSON file, with
//! serde defaults and validation matching what the clients accept.

use crate::context::Endpoint;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level, overridden by `RUST_LOG` when set
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Include the module path of each event
    #[serde(default = "default_true")]
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            include_target: true,
        }
    }
}

/// Explorer or wallet HTTP endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpEndpointConfig {
    pub host: String,

    pub port: u16,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub is_secure: bool,
}

impl HttpEndpointConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout_ms: default_http_timeout(),
            is_secure: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_secure(mut self, is_secure: bool) -> Self {
        self.is_secure = is_secure;
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port, self.is_secure)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.host, self.port, self.is_secure)?;

        if self.timeout_ms == 0 {
            return Err(Error::config("Timeout must be greater than 0"));
        }

        Ok(())
    }
}

/// Stratum endpoint of the mining client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningEndpointConfig {
    pub host: String,

    pub port: u16,

    pub api_key: String,

    #[serde(default)]
    pub is_secure: bool,
}

impl MiningEndpointConfig {
    pub fn new(host: impl Into<String>, port: u16, api_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            api_key: api_key.into(),
            is_secure: false,
        }
    }

    pub fn with_secure(mut self, is_secure: bool) -> Self {
        self.is_secure = is_secure;
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port, self.is_secure)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.host, self.port, self.is_secure)
    }
}

/// Complete configuration for the node clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub explorer: Option<HttpEndpointConfig>,

    #[serde(default)]
    pub wallet: Option<HttpEndpointConfig>,

    #[serde(default)]
    pub mining: Option<MiningEndpointConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a file.
    ///
    /// Files ending in `.json` are parsed as JSON, anything else as YAML.
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;

        let config: Self = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(explorer) = &self.explorer {
            explorer.validate()?;
        }
        if let Some(wallet) = &self.wallet {
            wallet.validate()?;
        }
        if let Some(mining) = &self.mining {
            mining.validate()?;
        }
        Ok(())
    }
}

fn validate_endpoint(host: &str, port: u16, is_secure: bool) -> Result<()> {
    if host.trim().is_empty() {
        return Err(Error::config("Host must not be empty"));
    }

    if port == 0 {
        return Err(Error::config("Port must be between 1 and 65535"));
    }

    let scheme = if is_secure { "https" } else { "http" };
    Url::parse(&format!("{}://{}:{}", scheme, host, port))
        .map_err(|e| Error::config(format!("Invalid endpoint {}:{}: {}", host, port, e)))?;

    Ok(())
}

// Default value functions for serde
fn default_http_timeout() -> u64 { 15000 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_format() -> LogFormat { LogFormat::Plain }
fn default_true() -> bool { true }
