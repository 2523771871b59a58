use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::models::session::{NewSession, Session};

/// Durable record of issued refresh tokens, keyed by token hash and user.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] if the token hash already exists.
    async fn create(&self, session: NewSession) -> StoreResult<Session>;

    /// Expired sessions are reported exactly like missing ones.
    async fn find_active_by_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>>;

    /// Returns true when this call removed the session. Revoking an unknown or
    /// already-revoked hash is a successful no-op that returns false.
    async fn revoke_by_token_hash(&self, token_hash: &str) -> StoreResult<bool>;

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64>;

    async fn revoke_others_for_user(&self, user_id: Uuid, except_hash: &str) -> StoreResult<u64>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: NewSession) -> StoreResult<Session> {
        sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, workspace_id, token_hash, expires_at, created_ip, user_agent)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, user_id, workspace_id, token_hash, expires_at, created_ip, user_agent, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(session.workspace_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(&session.created_ip)
        .bind(&session.user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, "duplicate session token"))
    }

    async fn find_active_by_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, user_id, workspace_id, token_hash, expires_at, created_ip, user_agent, created_at
             FROM sessions WHERE token_hash = $1 AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn revoke_by_token_hash(&self, token_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn revoke_others_for_user(&self, user_id: Uuid, except_hash: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND token_hash <> $2")
            .bind(user_id)
            .bind(except_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
