// User details and lookup

use crate::Result;
use async_trait::async_trait;
use jet_core::Principal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Account data the authentication manager works with.
pub trait UserDetails: Send + Sync {
    fn username(&self) -> &str;

    /// Stored password hash.
    fn password(&self) -> &str;

    fn salt(&self) -> &str;

    fn roles(&self) -> &BTreeSet<String>;

    fn permissions(&self) -> &BTreeSet<String>;

    fn is_enabled(&self) -> bool;

    fn is_account_non_expired(&self) -> bool;

    fn is_account_non_locked(&self) -> bool;

    fn is_credentials_non_expired(&self) -> bool;

    /// Identity to attach to a request once authenticated.
    fn to_principal(&self) -> Principal {
        Principal {
            username: self.username().to_string(),
            roles: self.roles().clone(),
            permissions: self.permissions().clone(),
        }
    }
}

/// Loads users by name for the authentication manager.
#[async_trait]
pub trait UserDetailsService: Send + Sync {
    type User: UserDetails + 'static;

    /// `Ok(None)` when no such user exists.
    async fn load_user_by_username(&self, username: &str) -> Result<Option<Self::User>>;
}

/// Plain user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub salt: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default = "enabled")]
    pub account_non_expired: bool,
    #[serde(default = "enabled")]
    pub account_non_locked: bool,
    #[serde(default = "enabled")]
    pub credentials_non_expired: bool,
}

fn enabled() -> bool {
    true
}

impl User {
    /// An enabled, unlocked user.
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password_hash.into(),
            salt: String::new(),
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
            enabled: true,
            account_non_expired: true,
            account_non_locked: true,
            credentials_non_expired: true,
        }
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn locked(mut self) -> Self {
        self.account_non_locked = false;
        self
    }
}

impl UserDetails for User {
    fn username(&self) -> &str {
        &self.username
    }

    fn password(&self) -> &str {
        &self.password
    }

    fn salt(&self) -> &str {
        &self.salt
    }

    fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_account_non_expired(&self) -> bool {
        self.account_non_expired
    }

    fn is_account_non_locked(&self) -> bool {
        self.account_non_locked
    }

    fn is_credentials_non_expired(&self) -> bool {
        self.credentials_non_expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_builder() {
        let user = User::new("ada", "$2b$10$hash")
            .with_role("ADMIN")
            .with_role("USER")
            .with_permission("reports:read")
            .locked();

        assert_eq!(user.username(), "ada");
        assert_eq!(user.password(), "$2b$10$hash");
        assert!(user.roles().contains("ADMIN"));
        assert!(user.is_enabled());
        assert!(!user.is_account_non_locked());
    }

    #[test]
    fn test_principal_carries_roles() {
        let principal = User::new("ada", "x").with_role("ADMIN").to_principal();
        assert_eq!(principal.username, "ada");
        assert!(principal.has_role("ADMIN"));
        assert!(principal.permissions.is_empty());
    }

    #[test]
    fn test_deserialize_defaults_to_active() {
        let user: User = serde_json::from_str(r#"{"username":"ada","password":"h"}"#).unwrap();
        assert!(user.is_enabled());
        assert!(user.is_credentials_non_expired());
        assert!(user.roles.is_empty());
    }
}
