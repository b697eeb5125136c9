//! Auth facade: register, login, logout, refresh and password change.
//!
//! This is the only layer that talks to the media store; every collaborator
//! is injected through `AuthService::new`.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::credentials::CredentialVerifier;
use crate::auth::dto::{PublicUser, RegisterInput, TokenPair};
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::jwt::TokenIssuer;
use crate::auth::password::PasswordHasher;
use crate::auth::repo::{RepoError, UserRepository};
use crate::auth::repo_types::NewUser;
use crate::auth::session::SessionManager;
use crate::media::{MediaKind, MediaStore};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn required<'a>(value: &'a str, field: &str) -> AuthResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::validation(format!("{field} is required")));
    }
    Ok(trimmed)
}

#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn UserRepository>,
    media: Arc<dyn MediaStore>,
    hasher: Arc<dyn PasswordHasher>,
    credentials: CredentialVerifier,
    sessions: SessionManager,
}

impl AuthService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        media: Arc<dyn MediaStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            credentials: CredentialVerifier::new(repo.clone(), hasher.clone()),
            sessions: SessionManager::new(repo.clone(), tokens),
            repo,
            media,
            hasher,
        }
    }

    pub fn with_revoke_on_reuse(mut self, revoke: bool) -> Self {
        self.sessions = self.sessions.with_revoke_on_reuse(revoke);
        self
    }

    pub async fn register(&self, input: RegisterInput) -> AuthResult<PublicUser> {
        let full_name = required(&input.full_name, "fullName")?.to_string();
        let email = required(&input.email, "email")?.to_string();
        let username = required(&input.username, "username")?.to_lowercase();
        // passwords are taken verbatim, only checked for blankness
        required(&input.password, "password")?;

        if !is_valid_email(&email) {
            return Err(AuthError::validation("Invalid email"));
        }

        if self
            .repo
            .exists_by_username_or_email(&username, &email)
            .await?
        {
            warn!(%username, "registration conflict");
            return Err(AuthError::Conflict);
        }

        let avatar = input
            .avatar
            .ok_or_else(|| AuthError::validation("Avatar file is required"))?;

        let password_hash = self.hasher.hash(&input.password)?;

        let avatar_url = match self.media.upload(MediaKind::Avatar, avatar).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "avatar upload failed");
                return Err(AuthError::MediaUploadFailed);
            }
        };

        let cover_image_url = match input.cover_image {
            Some(cover) => match self.media.upload(MediaKind::Cover, cover).await {
                Ok(url) => url,
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "cover upload failed; continuing without");
                    String::new()
                }
            },
            None => String::new(),
        };

        let created = self
            .repo
            .create(NewUser {
                username,
                email,
                full_name,
                avatar_url: avatar_url.clone(),
                cover_image_url: cover_image_url.clone(),
                password_hash,
            })
            .await;

        let id = match created {
            Ok(id) => id,
            Err(e) => {
                self.discard_uploads(&[avatar_url.as_str(), cover_image_url.as_str()]).await;
                return Err(match e {
                    RepoError::Duplicate => AuthError::Conflict,
                    RepoError::Other(e) => AuthError::Internal(e.context("create user")),
                });
            }
        };

        // the row exists and points at the uploads, so they are kept from here on
        let read_back = self
            .repo
            .find_by_id(id)
            .await
            .map_err(|e| AuthError::Internal(e.context("read back created user")))?;
        let Some(user) = read_back else {
            error!(user_id = %id, "user missing right after create");
            return Err(AuthError::Internal(anyhow::anyhow!(
                "user {id} could not be read back after create"
            )));
        };

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(PublicUser::from(user))
    }

    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> AuthResult<(PublicUser, TokenPair)> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AuthError::validation("Username or email is required"));
        }

        let user = self
            .credentials
            .verify_credentials(identifier, password)
            .await?;
        let tokens = self.sessions.start_session(user.id).await?;

        info!(user_id = %user.id, "user logged in");
        Ok((PublicUser::from(user), tokens))
    }

    /// `user_id` must come from an already verified access token.
    pub async fn logout(&self, user_id: Uuid) -> AuthResult<()> {
        self.sessions.end_session(user_id).await
    }

    pub async fn refresh(&self, presented: Option<&str>) -> AuthResult<TokenPair> {
        let presented = presented
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized)?;
        self.sessions.rotate(presented).await
    }

    /// Leaves the current refresh token in place.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        required(new_password, "newPassword")?;

        let user = self
            .repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !self.credentials.check_password(&user, old_password)? {
            warn!(user_id = %user_id, "change password: old password mismatch");
            return Err(AuthError::BadCredentials);
        }

        let hash = self.hasher.hash(new_password)?;
        if !self.repo.update_password_hash(user_id, &hash).await? {
            return Err(AuthError::Unauthorized);
        }
        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    pub async fn current_user(&self, user_id: Uuid) -> AuthResult<PublicUser> {
        self.repo
            .find_by_id(user_id)
            .await?
            .map(PublicUser::from)
            .ok_or(AuthError::Unauthorized)
    }

    async fn discard_uploads(&self, urls: &[&str]) {
        for url in urls.iter().filter(|u| !u.is_empty()) {
            if let Err(e) = self.media.discard(url).await {
                warn!(error = %format!("{e:#}"), %url, "failed to discard upload");
            }
        }
    }
}
