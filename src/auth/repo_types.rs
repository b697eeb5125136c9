use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. Never serialized directly; see `PublicUser`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,             // stored lower-cased
    pub email: String,
    pub full_name: String,
    pub avatar_url: String,
    pub cover_image_url: String,      // empty when no cover was uploaded
    pub password_hash: String,        // Argon2 PHC string
    pub refresh_token: Option<String>, // the single live refresh token
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields required to insert a user; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar_url: String,
    pub cover_image_url: String,
    pub password_hash: String,
}
