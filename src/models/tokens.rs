use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Namespaces for single-use tokens kept in the TTL cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    PasswordReset,
    EmailVerification,
    WorkspaceInvitation,
}

impl TokenPurpose {
    pub fn prefix(self) -> &'static str {
        match self {
            TokenPurpose::PasswordReset => "pwreset:",
            TokenPurpose::EmailVerification => "emailverify:",
            TokenPurpose::WorkspaceInvitation => "invitation:",
        }
    }

    pub fn key(self, token: &str) -> String {
        format!("{}{}", self.prefix(), token)
    }
}

/// A payload that can be stored behind an ephemeral token. The purpose (and
/// therefore the key prefix) is fixed per type.
pub trait EphemeralPayload: Serialize + DeserializeOwned + Send + Sync {
    const PURPOSE: TokenPurpose;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetPayload {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
}

impl EphemeralPayload for PasswordResetPayload {
    const PURPOSE: TokenPurpose = TokenPurpose::PasswordReset;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailPayload {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
}

impl EphemeralPayload for VerifyEmailPayload {
    const PURPOSE: TokenPurpose = TokenPurpose::EmailVerification;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationPayload {
    pub invitation_id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub role: String,
    pub inviter_id: Uuid,
}

impl EphemeralPayload for InvitationPayload {
    const PURPOSE: TokenPurpose = TokenPurpose::WorkspaceInvitation;
}
