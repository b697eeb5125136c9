//! Single-session lifecycle and refresh-token rotation.
//!
//! Per user: `NoSession` (no stored token) -> `Active(T)` -> `Active(T')` ...
//! -> `NoSession`. The stored refresh token is written only from here.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::claims::TokenKind;
use crate::auth::dto::TokenPair;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::jwt::TokenIssuer;
use crate::auth::repo::UserRepository;

#[derive(Clone)]
pub struct SessionManager {
    repo: Arc<dyn UserRepository>,
    tokens: TokenIssuer,
    revoke_on_reuse: bool,
}

impl SessionManager {
    pub fn new(repo: Arc<dyn UserRepository>, tokens: TokenIssuer) -> Self {
        Self {
            repo,
            tokens,
            revoke_on_reuse: false,
        }
    }

    /// End the whole session when a superseded refresh token is replayed.
    pub fn with_revoke_on_reuse(mut self, revoke: bool) -> Self {
        self.revoke_on_reuse = revoke;
        self
    }

    /// Issue a fresh pair and overwrite whatever session the user had.
    pub async fn start_session(&self, user_id: Uuid) -> AuthResult<TokenPair> {
        let pair = self.tokens.issue_pair(user_id)?;
        if !self
            .repo
            .set_refresh_token(user_id, Some(&pair.refresh_token))
            .await?
        {
            return Err(AuthError::Unauthorized);
        }
        info!(user_id = %user_id, "session started");
        Ok(pair)
    }

    /// Exchange the current refresh token for a new pair.
    ///
    /// The presented token must equal the stored one. The replacement is
    /// written with a compare-and-swap, so of two concurrent rotations of the
    /// same token exactly one succeeds and the other gets `RefreshReused`.
    pub async fn rotate(&self, presented: &str) -> AuthResult<TokenPair> {
        let claims = self.tokens.verify(presented, TokenKind::Refresh)?;
        let user_id = claims.sub;

        let user = self
            .repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        let Some(current) = user.refresh_token.as_deref() else {
            warn!(user_id = %user_id, "refresh presented with no active session");
            return Err(AuthError::RefreshReused);
        };
        if current != presented {
            return Err(self.reject_reuse(user_id).await);
        }

        let pair = self.tokens.issue_pair(user_id)?;
        if !self
            .repo
            .swap_refresh_token(user_id, presented, &pair.refresh_token)
            .await?
        {
            // lost the race against another rotation or a logout
            return Err(self.reject_reuse(user_id).await);
        }

        info!(user_id = %user_id, "session rotated");
        Ok(pair)
    }

    /// Clear the stored refresh token. Ending an ended session is a no-op.
    pub async fn end_session(&self, user_id: Uuid) -> AuthResult<()> {
        self.repo.set_refresh_token(user_id, None).await?;
        info!(user_id = %user_id, "session ended");
        Ok(())
    }

    async fn reject_reuse(&self, user_id: Uuid) -> AuthError {
        warn!(user_id = %user_id, "refresh token reuse detected");
        if self.revoke_on_reuse {
            if let Err(e) = self.repo.set_refresh_token(user_id, None).await {
                return AuthError::Internal(e.context("revoke session after refresh reuse"));
            }
            info!(user_id = %user_id, "session revoked after refresh reuse");
        }
        AuthError::RefreshReused
    }
}
