// Environment variable overrides

use crate::{ConfigError, Result};
use jet_core::logging::trace;
use serde_json::{Map, Value};
use std::env;
use std::path::Path;

/// Prefix of the variables read by default.
pub const DEFAULT_PREFIX: &str = "JET";

/// Maps `PREFIX_SECTION_KEY` variables onto `section.key` config entries.
///
/// `JET_SERVER_PORT=8080` becomes `{"server": {"port": 8080}}`. The `LOG`
/// section is an alias for `logging`. Values that parse as integers or
/// booleans are typed accordingly.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Overrides from the process environment.
    pub fn load(&self) -> Value {
        self.overrides(env::vars())
    }

    /// Overrides from a `.env` file, without touching the process environment.
    pub fn load_dotenv(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let vars = dotenvy::from_path_iter(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        Ok(self.overrides(vars))
    }

    /// Overrides from an explicit set of variables.
    pub fn overrides<I, K, V>(&self, vars: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut root = Map::new();
        let prefix = format!("{}_", self.prefix);

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(&prefix) else {
                continue;
            };
            let name = name.to_lowercase();
            trace!(variable = %key.as_ref(), "Applying environment override");

            let value = scalar(value.as_ref());
            match name.split_once('_') {
                Some((section, field)) if !field.is_empty() => {
                    let section = match section {
                        "log" => "logging",
                        other => other,
                    };
                    let entry = root
                        .entry(section.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(table) = entry {
                        table.insert(field.to_string(), value);
                    }
                }
                _ if !name.is_empty() => {
                    root.insert(name, value);
                }
                _ => {}
            }
        }

        Value::Object(root)
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

fn scalar(raw: &str) -> Value {
    if let Ok(number) = raw.parse::<u64>() {
        return Value::from(number);
    }
    if let Ok(number) = raw.parse::<i64>() {
        return Value::from(number);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
