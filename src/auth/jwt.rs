use std::time::Duration;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::dto::TokenPair;
use crate::auth::error::{AuthError, AuthResult};
use crate::config::JwtConfig;

#[derive(Clone)]
struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKey {
    fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs((ttl_minutes.max(0) as u64) * 60),
        }
    }
}

/// Mints and verifies access/refresh JWTs. Each kind has its own secret and ttl.
#[derive(Clone)]
pub struct TokenIssuer {
    access: SigningKey,
    refresh: SigningKey,
    issuer: String,
    audience: String,
}

impl TokenIssuer {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            access: SigningKey::new(cfg.access_secret.expose(), cfg.access_ttl_minutes),
            refresh: SigningKey::new(cfg.refresh_secret.expose(), cfg.refresh_ttl_minutes),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        self.key(kind).ttl
    }

    fn sign_at(&self, user_id: Uuid, kind: TokenKind, now: OffsetDateTime) -> AuthResult<String> {
        let key = self.key(kind);
        let exp = now + TimeDuration::seconds(key.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &key.encoding)
            .map_err(|e| anyhow::anyhow!("jwt encode: {e}"))?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn issue_access(&self, user_id: Uuid) -> AuthResult<String> {
        self.sign_at(user_id, TokenKind::Access, OffsetDateTime::now_utc())
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> AuthResult<String> {
        self.sign_at(user_id, TokenKind::Refresh, OffsetDateTime::now_utc())
    }

    pub fn issue_pair(&self, user_id: Uuid) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access(user_id)?,
            refresh_token: self.issue_refresh(user_id)?,
        })
    }

    /// Verify signature, expiry, issuer, audience and the `type` claim.
    pub fn verify(&self, token: &str, expected: TokenKind) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is exact, no grace window past `exp`
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let data = decode::<Claims>(token, &self.key(expected).decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AuthError::TokenMalformed,
                _ => AuthError::TokenInvalid,
            },
        )?;

        if data.claims.kind != expected {
            return Err(AuthError::TokenInvalid);
        }
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }
}
