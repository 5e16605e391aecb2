// Typed application settings

use crate::{ConfigError, ConfigValidator, Result, Validate};
use jet_core::logging::{LogConfig, LogFormat, LogLevel, LogOutput};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];
const LOG_FORMATS: &[&str] = &["json", "plain", "pretty", "compact"];

/// Top-level settings of a Jet application.
///
/// Every section has defaults, so an empty source yields a runnable config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl ApplicationConfig {
    /// Defaults overridden by `JET_*` environment variables.
    pub fn from_env() -> Result<Self> {
        crate::ConfigBuilder::new().env().build()
    }
}

impl Validate for ApplicationConfig {
    fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.logging.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// First address `host:port` resolves to.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "server.host {:?} resolved to no address",
                    self.host
                ))
            })
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.host, "server.host")?;
        ConfigValidator::is_port(self.port, "server.port")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// `stdout`, `stderr`, or a file path to append to.
    pub output: String,
    /// Filter directives, e.g. `jet_core=debug`; take precedence over `level`.
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            output: "stdout".to_string(),
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Subscriber configuration for [`LogConfig::init`].
    pub fn to_log_config(&self) -> Result<LogConfig> {
        let level: LogLevel = self
            .level
            .parse()
            .map_err(|e: jet_core::Error| ConfigError::ValidationError(e.to_string()))?;
        let format: LogFormat = self
            .format
            .parse()
            .map_err(|e: jet_core::Error| ConfigError::ValidationError(e.to_string()))?;
        let output = match self.output.trim() {
            "stdout" | "" => LogOutput::Stdout,
            "stderr" => LogOutput::Stderr,
            path => LogOutput::File(path.to_string()),
        };

        let mut config = LogConfig::new().level(level).format(format).output(output);
        if let Some(filter) = &self.filter {
            config = config.with_env_filter(filter.clone());
        }
        Ok(config)
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::one_of(&self.level, LOG_LEVELS, "logging.level")?;
        ConfigValidator::one_of(&self.format, LOG_FORMATS, "logging.format")
    }
}
