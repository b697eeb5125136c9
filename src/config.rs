use std::fmt;

use anyhow::Context;
use serde::Deserialize;

/// Signing secret that never shows up in `Debug` output.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: Secret,
    pub access_ttl_minutes: i64,
    pub refresh_secret: Secret,
    pub refresh_ttl_minutes: i64,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: Secret,
    pub region: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub media: MediaConfig,
    /// End the session when an already-rotated refresh token is presented.
    pub revoke_on_refresh_reuse: bool,
    pub cookie_secure: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;

        let jwt = JwtConfig {
            access_secret: Secret::new(
                std::env::var("ACCESS_TOKEN_SECRET").context("ACCESS_TOKEN_SECRET")?,
            ),
            access_ttl_minutes: env_i64("ACCESS_TOKEN_TTL_MINUTES", 15),
            refresh_secret: Secret::new(
                std::env::var("REFRESH_TOKEN_SECRET").context("REFRESH_TOKEN_SECRET")?,
            ),
            refresh_ttl_minutes: env_i64("REFRESH_TOKEN_TTL_MINUTES", 60 * 24 * 14),
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "vidhub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "vidhub-users".into()),
        };
        jwt.validate()?;

        let endpoint = std::env::var("MEDIA_ENDPOINT").context("MEDIA_ENDPOINT")?;
        let bucket = std::env::var("MEDIA_BUCKET").context("MEDIA_BUCKET")?;
        let public_base_url = std::env::var("MEDIA_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let media = MediaConfig {
            access_key: std::env::var("MEDIA_ACCESS_KEY").context("MEDIA_ACCESS_KEY")?,
            secret_key: Secret::new(
                std::env::var("MEDIA_SECRET_KEY").context("MEDIA_SECRET_KEY")?,
            ),
            region: std::env::var("MEDIA_REGION").unwrap_or_else(|_| "us-east-1".into()),
            endpoint,
            bucket,
            public_base_url,
        };

        Ok(Self {
            database_url,
            jwt,
            media,
            revoke_on_refresh_reuse: env_bool("AUTH_REVOKE_ON_REFRESH_REUSE", false),
            cookie_secure: env_bool("COOKIE_SECURE", true),
        })
    }
}

impl JwtConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.access_secret.expose().is_empty() && !self.refresh_secret.expose().is_empty(),
            "token secrets must not be empty"
        );
        anyhow::ensure!(
            self.access_secret != self.refresh_secret,
            "access and refresh token secrets must differ"
        );
        anyhow::ensure!(
            self.access_ttl_minutes > 0 && self.refresh_ttl_minutes > 0,
            "token ttl must be positive"
        );
        Ok(())
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(access: &str, refresh: &str) -> JwtConfig {
        JwtConfig {
            access_secret: Secret::new(access),
            access_ttl_minutes: 15,
            refresh_secret: Secret::new(refresh),
            refresh_ttl_minutes: 60,
            issuer: "iss".into(),
            audience: "aud".into(),
        }
    }

    #[test]
    fn secret_debug_is_redacted() {
        let out = format!("{:?}", jwt("top-secret-a", "top-secret-r"));
        assert!(!out.contains("top-secret"));
        assert!(out.contains("***"));
    }

    #[test]
    fn rejects_shared_secret() {
        let err = jwt("same", "same").validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn accepts_distinct_secrets() {
        assert!(jwt("a", "r").validate().is_ok());
    }
}
