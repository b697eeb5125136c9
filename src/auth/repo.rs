//! User persistence.
//!
//! `refresh_token` is the only mutable state shared between concurrent
//! requests. Rotation goes through `swap_refresh_token`, which must be a
//! single compare-and-swap so that two racing rotations of the same token
//! cannot both succeed.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("duplicate username or email")]
    Duplicate,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and return its id.
    async fn create(&self, user: NewUser) -> Result<Uuid, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Match `identifier` against the lower-cased username or the exact email.
    async fn find_by_identifier(&self, identifier: &str) -> anyhow::Result<Option<User>>;

    async fn exists_by_username_or_email(&self, username: &str, email: &str)
        -> anyhow::Result<bool>;

    /// Returns false when no such user exists.
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool>;

    /// Unconditional overwrite. Returns false when no such user exists.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> anyhow::Result<bool>;

    /// Replace the stored token with `new` only if it still equals `expected`.
    async fn swap_refresh_token(&self, id: Uuid, expected: &str, new: &str)
        -> anyhow::Result<bool>;
}

const USER_COLUMNS: &str = "id, username, email, full_name, avatar_url, cover_image_url, \
                            password_hash, refresh_token, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> Result<Uuid, RepoError> {
        let res = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (username, email, full_name, avatar_url, cover_image_url, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.avatar_url)
        .bind(&user.cover_image_url)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(RepoError::Duplicate),
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_identifier(&self, identifier: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = lower($1) OR email = $1 LIMIT 1"
        ))
        .bind(identifier)
        .fetch_optional(&self.db)
        .await
        .context("find user by identifier")?;
        Ok(user)
    }

    async fn exists_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 OR email = $2)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.db)
        .await
        .context("check user uniqueness")?;
        Ok(exists)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .context("update password hash")?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(&self.db)
        .await
        .context("set refresh token")?;
        Ok(res.rows_affected() == 1)
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        new: &str,
    ) -> anyhow::Result<bool> {
        // Row-level lock taken by UPDATE serializes concurrent swaps on the same user.
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $3, updated_at = now()
             WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(new)
        .execute(&self.db)
        .await
        .context("swap refresh token")?;
        Ok(res.rows_affected() == 1)
    }
}

/// Process-local repository with the same contract as the Postgres one.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<Uuid, RepoError> {
        let mut users = self.users.lock().await;
        if users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(RepoError::Duplicate);
        }
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        users.insert(
            id,
            User {
                id,
                username: user.username,
                email: user.email,
                full_name: user.full_name,
                avatar_url: user.avatar_url,
                cover_image_url: user.cover_image_url,
                password_hash: user.password_hash,
                refresh_token: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> anyhow::Result<Option<User>> {
        let lowered = identifier.to_lowercase();
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|u| u.username == lowered || u.email == identifier)
            .cloned())
    }

    async fn exists_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<bool> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .any(|u| u.username == username || u.email == email))
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let mut users = self.users.lock().await;
        Ok(match users.get_mut(&id) {
            Some(u) => {
                u.password_hash = password_hash.to_string();
                u.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        })
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> anyhow::Result<bool> {
        let mut users = self.users.lock().await;
        Ok(match users.get_mut(&id) {
            Some(u) => {
                u.refresh_token = token.map(str::to_string);
                u.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        })
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        new: &str,
    ) -> anyhow::Result<bool> {
        let mut users = self.users.lock().await;
        Ok(match users.get_mut(&id) {
            Some(u) if u.refresh_token.as_deref() == Some(expected) => {
                u.refresh_token = Some(new.to_string());
                u.updated_at = OffsetDateTime::now_utc();
                true
            }
            _ => false,
        })
    }
}
