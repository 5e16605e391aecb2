//! Application configuration for Jet
//!
//! Settings are layered: defaults, then each source in the order it was
//! added to a [`ConfigBuilder`]. Later sources win key by key.
//!
//! ```no_run
//! use jet_config::ConfigBuilder;
//!
//! # fn main() -> jet_config::Result<()> {
//! let config = ConfigBuilder::new()
//!     .file("config/jet.toml")
//!     .optional_dotenv(".env")
//!     .env()
//!     .build()?;
//!
//! let _guard = config.logging.to_log_config()?.init();
//! let addr = config.server.socket_addr()?;
//! # let _ = addr;
//! # Ok(())
//! # }
//! ```

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::{DEFAULT_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat, merge};
pub use settings::{ApplicationConfig, LoggingConfig, ServerConfig};
pub use validation::{ConfigValidator, Validate};

use jet_core::logging::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

enum Source {
    File { path: PathBuf, required: bool },
    Dotenv { path: PathBuf, required: bool },
    Env(EnvLoader),
    Value(Value),
}

/// Collects configuration sources and merges them into typed settings.
#[derive(Default)]
pub struct ConfigBuilder {
    sources: Vec<Source>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A JSON or TOML file that must exist.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File {
            path: path.into(),
            required: true,
        });
        self
    }

    /// A JSON or TOML file, skipped when absent.
    pub fn optional_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File {
            path: path.into(),
            required: false,
        });
        self
    }

    /// `JET_*` entries of a `.env` file that must exist.
    pub fn dotenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::Dotenv {
            path: path.into(),
            required: true,
        });
        self
    }

    pub fn optional_dotenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::Dotenv {
            path: path.into(),
            required: false,
        });
        self
    }

    /// `JET_*` process environment variables.
    pub fn env(self) -> Self {
        self.env_with(EnvLoader::default())
    }

    pub fn env_with(mut self, loader: EnvLoader) -> Self {
        self.sources.push(Source::Env(loader));
        self
    }

    /// An in-memory layer, e.g. settings computed by the application.
    pub fn set<T: Serialize>(mut self, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        self.sources.push(Source::Value(value));
        Ok(self)
    }

    /// Merged sources, before deserialization.
    pub fn merged(&self) -> Result<Value> {
        let mut root = Value::Object(serde_json::Map::new());

        for source in &self.sources {
            let layer = match source {
                Source::File { path, required } => {
                    if !required && !path.exists() {
                        debug!(path = %path.display(), "Optional configuration file absent");
                        continue;
                    }
                    ConfigLoader::auto(path)?.load_file(path)?
                }
                Source::Dotenv { path, required } => {
                    if !required && !path.exists() {
                        debug!(path = %path.display(), "Optional .env file absent");
                        continue;
                    }
                    EnvLoader::default().load_dotenv(path)?
                }
                Source::Env(loader) => loader.load(),
                Source::Value(value) => value.clone(),
            };
            merge(&mut root, layer);
        }

        Ok(root)
    }

    /// Deserialize and validate the merged settings as `T`.
    pub fn build_as<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let settings: T = serde_json::from_value(self.merged()?)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn build(&self) -> Result<ApplicationConfig> {
        let config: ApplicationConfig = self.build_as()?;
        info!(
            host = %config.server.host,
            port = config.server.port,
            level = %config.logging.level,
            "Configuration loaded"
        );
        Ok(config)
    }
}
