//! Failure kinds surfaced by the authentication core.
//!
//! Every operation returns `AuthResult<T>`; the HTTP layer renders the error
//! through `IntoResponse` without leaking internal detail.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::dto::ApiResponse;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("User with same username or email already exists")]
    Conflict,

    #[error("User does not exist")]
    NotFound,

    #[error("Invalid password")]
    BadCredentials,

    #[error("Unauthorized request")]
    Unauthorized,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Malformed token")]
    TokenMalformed,

    #[error("Refresh token has already been used")]
    RefreshReused,

    #[error("Avatar upload failed")]
    MediaUploadFailed,

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AuthError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::MediaUploadFailed => StatusCode::BAD_REQUEST,
            AuthError::Conflict => StatusCode::CONFLICT,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::BadCredentials
            | AuthError::Unauthorized
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::TokenMalformed
            | AuthError::RefreshReused => StatusCode::UNAUTHORIZED,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Internal(_) => "Something went wrong, please try again later".into(),
            other => other.to_string(),
        }
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection.body_text(), "rejected json body");
        AuthError::validation("Invalid request body")
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AuthError::Internal(e) = &self {
            error!(error = %format!("{e:#}"), "internal error");
        }
        let body = ApiResponse::<()>::failure(status, self.public_message());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AuthError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(AuthError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AuthError::BadCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::RefreshReused.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::MediaUploadFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("db down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_hides_cause() {
        let err = AuthError::Internal(anyhow::anyhow!("connection refused to 10.0.0.3"));
        assert!(!err.public_message().contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn response_uses_failure_envelope() {
        let res = AuthError::Conflict.into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["statusCode"], 409);
        assert!(v["message"].as_str().unwrap().contains("already exists"));
    }
}
