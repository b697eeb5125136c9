use std::sync::Arc;

use tracing::warn;

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::password::PasswordHasher;
use crate::auth::repo::UserRepository;
use crate::auth::repo_types::User;

/// Resolves a login identifier to a user and checks the password.
#[derive(Clone)]
pub struct CredentialVerifier {
    repo: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
}

impl CredentialVerifier {
    pub fn new(repo: Arc<dyn UserRepository>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { repo, hasher }
    }

    /// `identifier` is a username (compared lower-cased) or an exact email.
    pub async fn verify_credentials(&self, identifier: &str, password: &str) -> AuthResult<User> {
        let user = self
            .repo
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| {
                warn!(event = "login_unknown_identity", "login failed: no such user");
                AuthError::NotFound
            })?;

        if !self.check_password(&user, password)? {
            warn!(event = "login_bad_password", user_id = %user.id, "login failed: wrong password");
            return Err(AuthError::BadCredentials);
        }
        Ok(user)
    }

    pub fn check_password(&self, user: &User, password: &str) -> AuthResult<bool> {
        Ok(self.hasher.verify(password, &user.password_hash)?)
    }
}
