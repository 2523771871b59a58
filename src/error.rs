use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::StoreError;

/// Failure kinds surfaced by the auth endpoints.
///
/// Token failures are deliberately collapsed into [`AuthError::InvalidOrExpiredToken`]
/// so callers cannot tell "never issued" from "already used" or "expired".
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("too many requests")]
    RateLimited,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "account.invalid_credentials",
            AuthError::InvalidOrExpiredToken => "account.invalid_token",
            AuthError::Unauthorized => "unauthorized",
            AuthError::Forbidden => "account.forbidden",
            AuthError::RateLimited => "account.rate_limited",
            AuthError::Conflict(_) => "account.conflict",
            AuthError::BadRequest(_) => "request.invalid_body",
            AuthError::Internal(_) => "account.operation_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::InvalidOrExpiredToken
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => AuthError::Conflict(what),
            StoreError::Database(e) => AuthError::Internal(e.into()),
            StoreError::Other(e) => AuthError::Internal(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::Internal(err) => {
                tracing::error!(error = ?err, "auth operation failed");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "code": self.code(),
        });

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_share_one_public_shape() {
        let err = AuthError::InvalidOrExpiredToken;
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), "account.invalid_token");
        assert_eq!(err.to_string(), "invalid or expired token");
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let err = AuthError::Internal(anyhow::anyhow!("connection reset by peer"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_conflict_maps_to_conflict() {
        let err: AuthError = StoreError::Conflict("duplicate session token".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "account.conflict");
    }

    #[test]
    fn forbidden_is_403() {
        assert_eq!(AuthError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::Forbidden.code(), "account.forbidden");
    }
}
