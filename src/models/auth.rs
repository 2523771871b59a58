use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::{User, UserProfile};

/// Claims embedded in the JWT access token
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub auth_version: i32,
    pub iss: String,
    pub aud: String,
    pub jti: String,
    pub exp: usize,
    pub iat: usize,
}

/// The authenticated caller, resolved from a verified access token and a
/// fresh read of the user row.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: User,
    pub workspace_id: Uuid,
}

/// Network context captured at session creation.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

/// Access + refresh pair handed out on login, refresh and invitation acceptance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserProfile,
    pub token: String,
    pub refresh_token: String,
}

impl LoginResponse {
    pub fn new(user: User, tokens: TokenPair) -> Self {
        Self {
            user: user.into(),
            token: tokens.token,
            refresh_token: tokens.refresh_token,
        }
    }
}

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct InviteUserRequest {
    pub email: String,
    pub role: super::user::UserRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationResponse {
    pub email: String,
    pub role: super::user::UserRole,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInvitationRequest {
    pub token: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}
