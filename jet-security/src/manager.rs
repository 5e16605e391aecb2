// Authentication manager

use crate::{PasswordEncoder, Result, SecurityError, UserDetails, UserDetailsService};
use jet_core::logging::{debug, warn};
use jet_core::{Injectable, InjectableField, ResolvedFields};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Hashed once and checked on the unknown-user path.
const DECOY_PASSWORD: &str = "jet-security-decoy-password";

/// Checks a username and password against a [`UserDetailsService`].
///
/// Unknown users and wrong passwords fail with different errors here, for
/// logging. Both become the same `Unauthorized` error once converted into a
/// `jet_core::Error`. Both also run one password verification, so response
/// time does not reveal whether a username exists.
pub struct AuthenticationManager<S: UserDetailsService> {
    user_details_service: Arc<S>,
    password_encoder: Arc<PasswordEncoder>,
    decoy_hash: OnceCell<String>,
}

impl<S: UserDetailsService> AuthenticationManager<S> {
    pub fn new(user_details_service: Arc<S>, password_encoder: Arc<PasswordEncoder>) -> Self {
        Self {
            user_details_service,
            password_encoder,
            decoy_hash: OnceCell::new(),
        }
    }

    pub fn user_details_service(&self) -> &Arc<S> {
        &self.user_details_service
    }

    pub fn password_encoder(&self) -> &Arc<PasswordEncoder> {
        &self.password_encoder
    }

    /// The user named `username`, provided `password` matches its stored hash.
    ///
    /// Account status flags are not checked.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<S::User> {
        let Some(user) = self
            .user_details_service
            .load_user_by_username(username)
            .await?
        else {
            self.verify_decoy(password).await;
            warn!(username = %username, "Authentication failed: unknown user");
            return Err(SecurityError::UserNotFound(username.to_string()));
        };

        if !self.password_encoder.matches(password, user.password()).await? {
            warn!(username = %username, "Authentication failed: password mismatch");
            return Err(SecurityError::InvalidCredentials(username.to_string()));
        }

        debug!(username = %username, "Authenticated");
        Ok(user)
    }

    /// Same verification work as a known user, against a hash nobody owns.
    async fn verify_decoy(&self, password: &str) {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.password_encoder.encode(DECOY_PASSWORD))
            .await;
        match decoy {
            Ok(hash) => {
                let _ = self.password_encoder.matches(password, hash).await;
            }
            Err(e) => debug!(error = %e, "Decoy hash unavailable"),
        }
    }
}

impl<S: UserDetailsService + 'static> Injectable for AuthenticationManager<S> {
    fn required_fields() -> Vec<InjectableField> {
        vec![
            InjectableField::registered::<S>("user_details_service"),
            InjectableField::registered::<PasswordEncoder>("password_encoder"),
        ]
    }

    fn construct(fields: &mut ResolvedFields) -> jet_core::Result<Self> {
        Ok(Self::new(
            fields.take("user_details_service")?,
            fields.take("password_encoder")?,
        ))
    }
}
