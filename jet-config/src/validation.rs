// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Checked after a configuration is deserialized.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Field-level rules shared by [`Validate`] implementations.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            )));
        }
        Ok(())
    }

    pub fn one_of(value: &str, allowed: &[&str], field: &str) -> Result<()> {
        if !allowed.iter().any(|candidate| candidate.eq_ignore_ascii_case(value.trim())) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be one of [{}], got {:?}",
                field,
                allowed.join(", "),
                value
            )));
        }
        Ok(())
    }

    pub fn is_port(value: u16, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be a valid port number",
                field
            )));
        }
        Ok(())
    }
}
