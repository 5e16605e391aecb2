// Error types for authentication

use jet_core::logging::error;
use thiserror::Error;

/// Message every authentication failure carries outside this crate.
pub const BAD_CREDENTIALS: &str = "Bad credentials";

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid credentials for user: {0}")]
    InvalidCredentials(String),

    #[error("User lookup failed: {0}")]
    UserLookup(String),

    #[error("Password adapter not initialized")]
    AdapterNotInitialized,

    #[error("Password adapter already initialized")]
    AdapterAlreadyInitialized,

    #[error("Invalid password options: {0}")]
    InvalidOptions(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Password verification error: {0}")]
    PasswordVerify(String),
}

impl SecurityError {
    /// Whether this is a failed login rather than a fault.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            SecurityError::UserNotFound(_) | SecurityError::InvalidCredentials(_)
        )
    }
}

impl From<SecurityError> for jet_core::Error {
    /// Both authentication failures map to the same error so callers cannot
    /// tell unknown users from wrong passwords.
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::UserNotFound(_) | SecurityError::InvalidCredentials(_) => {
                jet_core::Error::Unauthorized(BAD_CREDENTIALS.to_string())
            }
            SecurityError::AdapterNotInitialized | SecurityError::AdapterAlreadyInitialized => {
                error!(error = %err, "Password encoder used out of bootstrap order");
                jet_core::Error::Internal(err.to_string())
            }
            other => jet_core::Error::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_are_indistinguishable_outside() {
        let missing: jet_core::Error = SecurityError::UserNotFound("ghost".into()).into();
        let wrong: jet_core::Error = SecurityError::InvalidCredentials("ada".into()).into();

        assert_eq!(missing.to_string(), wrong.to_string());
        assert_eq!(missing.status_code().as_u16(), 401);
        assert!(!missing.to_string().contains("ghost"));
    }

    #[test]
    fn test_bootstrap_bug_is_server_error() {
        let err: jet_core::Error = SecurityError::AdapterNotInitialized.into();
        assert!(err.is_server_error());
    }
}
