use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    cache::TtlCache,
    config::Config,
    db::{SessionStore, UserStore},
    error::{AuthError, AuthResult},
    middleware::rate_limit::{RateLimitPurpose, RateLimiter},
    models::{
        auth::{Actor, ClientInfo, InvitationResponse, TokenPair},
        session::{NewSession, Session},
        tokens::{InvitationPayload, PasswordResetPayload, VerifyEmailPayload},
        user::{normalize_email, NewUser, User, UserRole},
    },
    services::{
        ephemeral::EphemeralTokens,
        metrics::{LOGINS_COUNTER, PASSWORD_RESETS_COUNTER, REFRESH_COUNTER},
        notifications::{Notification, NotificationDispatcher},
        password::PasswordHasher,
        token_issuer::{hash_refresh_token, issue_refresh_token, TokenIssuer},
    },
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Lifetimes and link targets, copied out of [`Config`] once.
#[derive(Debug, Clone)]
struct Lifetimes {
    app_base_url: String,
    refresh_token: Duration,
    password_reset: Duration,
    verify_email: Duration,
    invitation: Duration,
}

/// Orchestrates every session transition: login, rotation, revocation,
/// password reset, email verification and invitation acceptance.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    ephemeral: EphemeralTokens,
    issuer: TokenIssuer,
    passwords: PasswordHasher,
    limiter: RateLimiter,
    notifications: NotificationDispatcher,
    lifetimes: Lifetimes,
}

impl AuthService {
    pub fn new(
        config: &Config,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        cache: Arc<dyn TtlCache>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            users,
            sessions,
            ephemeral: EphemeralTokens::new(cache.clone()),
            issuer: TokenIssuer::from_config(config),
            passwords: PasswordHasher::new(config.bcrypt_cost),
            limiter: RateLimiter::new(cache, config.rate_limits.clone()),
            notifications,
            lifetimes: Lifetimes {
                app_base_url: config.app_base_url.trim_end_matches('/').to_string(),
                refresh_token: Duration::from_secs(config.refresh_token_ttl_seconds),
                password_reset: Duration::from_secs(config.password_reset_ttl_seconds),
                verify_email: Duration::from_secs(config.verify_email_ttl_seconds),
                invitation: Duration::from_secs(config.invitation_ttl_seconds),
            },
        }
    }

    fn link(&self, path: &str, token: &str) -> String {
        format!("{}/{path}?token={token}", self.lifetimes.app_base_url)
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> AuthResult<(User, TokenPair)> {
        let email = normalize_email(email);
        let per_client = format!("{}:{}", email, client.ip);
        self.limiter
            .check_all(&[
                (RateLimitPurpose::Login, per_client.as_str()),
                (RateLimitPurpose::LoginAccount, email.as_str()),
            ])
            .await?;

        let user = self.users.find_by_email(&email).await?;
        let valid = self
            .passwords
            .verify(password, user.as_ref().map(|u| u.password_hash.as_str()))
            .await?;

        let mut user = match user {
            Some(user) if valid => user,
            _ => {
                LOGINS_COUNTER.with_label_values(&["failed"]).inc();
                return Err(AuthError::InvalidCredentials);
            }
        };

        if user.auth_version <= 0 {
            user.auth_version = self.users.ensure_auth_version(user.id).await?;
        }

        let tokens = self.issue_session(&user, client).await?;
        LOGINS_COUNTER.with_label_values(&["success"]).inc();
        tracing::info!(user_id = %user.id, workspace_id = %user.workspace_id, "login succeeded");

        self.notifications.dispatch(Notification::LoginAlert {
            to: user.email.clone(),
            name: user.display_name(),
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            at: Utc::now(),
        });

        Ok((user, tokens))
    }

    async fn issue_session(&self, user: &User, client: &ClientInfo) -> AuthResult<TokenPair> {
        let token = self
            .issuer
            .issue_access_token(user.id, user.workspace_id, user.auth_version)?;
        let refresh_token = issue_refresh_token()?;

        let ip = if client.ip.trim().is_empty() {
            "unknown".to_string()
        } else {
            client.ip.clone()
        };

        self.sessions
            .create(NewSession {
                user_id: user.id,
                workspace_id: user.workspace_id,
                token_hash: hash_refresh_token(&refresh_token),
                expires_at: Utc::now() + chrono::Duration::from_std(self.lifetimes.refresh_token)
                    .map_err(anyhow::Error::from)?,
                created_ip: ip,
                user_agent: client.user_agent.clone(),
            })
            .await?;

        Ok(TokenPair {
            token,
            refresh_token,
        })
    }

    async fn active_session(&self, raw_refresh_token: &str) -> AuthResult<Session> {
        let raw = raw_refresh_token.trim();
        if raw.is_empty() {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        self.sessions
            .find_active_by_token_hash(&hash_refresh_token(raw), Utc::now())
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)
    }

    /// Rotates a refresh token. The old session is revoked before the new one
    /// exists, and only the caller whose revoke actually removed the row gets
    /// a new pair.
    pub async fn refresh(
        &self,
        raw_refresh_token: &str,
        client: &ClientInfo,
    ) -> AuthResult<TokenPair> {
        let result = self.rotate(raw_refresh_token, client).await;
        let status = if result.is_ok() { "success" } else { "failed" };
        REFRESH_COUNTER.with_label_values(&[status]).inc();
        result
    }

    async fn rotate(&self, raw_refresh_token: &str, client: &ClientInfo) -> AuthResult<TokenPair> {
        let session = self.active_session(raw_refresh_token).await?;

        let Some(user) = self.users.find_by_id(session.user_id).await? else {
            self.sessions.revoke_by_token_hash(&session.token_hash).await?;
            return Err(AuthError::InvalidOrExpiredToken);
        };

        if !self.sessions.revoke_by_token_hash(&session.token_hash).await? {
            tracing::info!(user_id = %user.id, "refresh lost a concurrent rotation");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        self.issue_session(&user, client).await
    }

    /// Unknown tokens are accepted so logout stays idempotent.
    pub async fn logout(&self, raw_refresh_token: &str) -> AuthResult<()> {
        let raw = raw_refresh_token.trim();
        if raw.is_empty() {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        self.sessions
            .revoke_by_token_hash(&hash_refresh_token(raw))
            .await?;
        Ok(())
    }

    /// Kills every session and, through the version bump, every access token.
    pub async fn logout_all(&self, raw_refresh_token: &str) -> AuthResult<()> {
        let session = self.active_session(raw_refresh_token).await?;
        let version = self.users.bump_auth_version(session.user_id).await?;
        let revoked = self.sessions.revoke_all_for_user(session.user_id).await?;
        tracing::info!(user_id = %session.user_id, auth_version = version, revoked, "signed out everywhere");
        Ok(())
    }

    /// Keeps the presented session, revokes the rest. Access tokens already
    /// handed to other devices stay valid until they expire.
    pub async fn logout_others(&self, raw_refresh_token: &str) -> AuthResult<()> {
        let session = self.active_session(raw_refresh_token).await?;
        let revoked = self
            .sessions
            .revoke_others_for_user(session.user_id, &session.token_hash)
            .await?;
        tracing::info!(user_id = %session.user_id, revoked, "signed out other sessions");
        Ok(())
    }

    /// Silent for unknown emails.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        self.limiter
            .check(RateLimitPurpose::PasswordReset, &email)
            .await?;

        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(());
        };

        let payload = PasswordResetPayload {
            user_id: user.id,
            workspace_id: user.workspace_id,
            email: user.email.clone(),
        };
        let (token, expires_at) = self
            .ephemeral
            .put(&payload, self.lifetimes.password_reset)
            .await?;
        PASSWORD_RESETS_COUNTER.with_label_values(&["requested"]).inc();

        self.notifications.dispatch(Notification::PasswordReset {
            to: user.email.clone(),
            name: user.display_name(),
            reset_url: self.link("reset-password", &token),
            expires_at,
        });
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        validate_password(new_password)?;

        let payload: PasswordResetPayload = self
            .ephemeral
            .get(token)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        let user = self
            .users
            .find_by_id(payload.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let hash = self.passwords.hash(new_password).await?;
        let version = self.users.update_password(user.id, &hash).await?;
        let revoked = self.sessions.revoke_all_for_user(user.id).await?;
        self.ephemeral.consume::<PasswordResetPayload>(token).await?;

        PASSWORD_RESETS_COUNTER.with_label_values(&["completed"]).inc();
        tracing::info!(user_id = %user.id, auth_version = version, revoked, "password reset");

        self.notifications.dispatch(Notification::PasswordChanged {
            to: user.email.clone(),
            name: user.display_name(),
        });
        Ok(())
    }

    /// Silent for unknown and already-verified emails.
    pub async fn request_email_verification(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        self.limiter
            .check(RateLimitPurpose::VerifyEmail, &email)
            .await?;

        let user = match self.users.find_by_email(&email).await? {
            Some(user) if !user.is_email_verified => user,
            _ => return Ok(()),
        };

        let payload = VerifyEmailPayload {
            user_id: user.id,
            workspace_id: user.workspace_id,
            email: user.email.clone(),
        };
        let (token, expires_at) = self
            .ephemeral
            .put(&payload, self.lifetimes.verify_email)
            .await?;

        self.notifications.dispatch(Notification::EmailVerification {
            to: user.email.clone(),
            name: user.display_name(),
            verify_url: self.link("verify-email", &token),
            expires_at,
        });
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> AuthResult<()> {
        let payload: VerifyEmailPayload = self
            .ephemeral
            .get(token)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        let user = self
            .users
            .find_by_id(payload.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        self.users.mark_email_verified(user.id).await?;
        self.ephemeral.consume::<VerifyEmailPayload>(token).await?;
        tracing::info!(user_id = %user.id, "email verified");
        Ok(())
    }

    pub async fn create_invitation(
        &self,
        actor: &Actor,
        email: &str,
        role: UserRole,
    ) -> AuthResult<InvitationResponse> {
        require_admin(actor)?;
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(AuthError::BadRequest("a valid email is required".into()));
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("user with this email already exists".into()));
        }

        let payload = InvitationPayload {
            invitation_id: Uuid::new_v4(),
            workspace_id: actor.workspace_id,
            email: email.clone(),
            role: role.to_string(),
            inviter_id: actor.user.id,
        };
        let (token, expires_at) = self
            .ephemeral
            .put(&payload, self.lifetimes.invitation)
            .await?;
        tracing::info!(
            invitation_id = %payload.invitation_id,
            workspace_id = %actor.workspace_id,
            "invitation created"
        );

        self.notifications.dispatch(Notification::Invitation {
            to: email.clone(),
            inviter_name: actor.user.display_name(),
            role: role.to_string(),
            accept_url: self.link("accept-invitation", &token),
            expires_at,
        });

        Ok(InvitationResponse {
            email,
            role,
            expires_at,
        })
    }

    /// Creates the invited account (email pre-verified) and signs it in.
    pub async fn accept_invitation(
        &self,
        token: &str,
        first_name: &str,
        last_name: &str,
        password: &str,
        client: &ClientInfo,
    ) -> AuthResult<(User, TokenPair)> {
        validate_password(password)?;

        let payload: InvitationPayload = self
            .ephemeral
            .get(token)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        let role: UserRole = payload
            .role
            .parse()
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        let email = normalize_email(&payload.email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("user with this email already exists".into()));
        }

        let password_hash = self.passwords.hash(password).await?;
        let user = self
            .users
            .create(NewUser {
                workspace_id: payload.workspace_id,
                email,
                password_hash,
                first_name: first_name.trim().to_string(),
                last_name: last_name.trim().to_string(),
                role,
                is_email_verified: true,
            })
            .await?;
        self.ephemeral.consume::<InvitationPayload>(token).await?;
        tracing::info!(
            user_id = %user.id,
            invitation_id = %payload.invitation_id,
            "invitation accepted"
        );

        let tokens = self.issue_session(&user, client).await?;
        Ok((user, tokens))
    }

    /// Resolves a bearer token to a live actor. No validity is cached: the
    /// user row is read on every call so a version bump takes effect at once.
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<Actor> {
        let claims = self
            .issuer
            .decode_access_token(access_token)
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        let user = self
            .users
            .find_by_id(claims.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        if user.auth_version != claims.auth_version || user.workspace_id != claims.workspace_id {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        Ok(Actor {
            workspace_id: user.workspace_id,
            user,
        })
    }
}

fn require_admin(actor: &Actor) -> AuthResult<()> {
    match actor.user.role.parse::<UserRole>() {
        Ok(UserRole::Admin) => Ok(()),
        _ => Err(AuthError::Forbidden),
    }
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}
