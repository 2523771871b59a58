use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::models::user::{NewUser, User};

const USER_COLUMNS: &str = "id, workspace_id, email, password_hash, first_name, last_name, role, \
     is_email_verified, auth_version, created_at, updated_at";

/// Credential store: the slice of the account domain the session lifecycle
/// reads and mutates.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// `email` must already be normalised.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create(&self, user: NewUser) -> StoreResult<User>;

    /// Lifts a legacy `auth_version` of zero or less to 1. Returns the current value.
    async fn ensure_auth_version(&self, id: Uuid) -> StoreResult<i32>;

    /// Atomically increments `auth_version`, returning the new value.
    async fn bump_auth_version(&self, id: Uuid) -> StoreResult<i32>;

    /// Replaces the password hash and increments `auth_version` in one write.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<i32>;

    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users
                (id, workspace_id, email, password_hash, first_name, last_name, role, is_email_verified)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user.workspace_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.to_string())
        .bind(user.is_email_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, "user with this email already exists"))
    }

    async fn ensure_auth_version(&self, id: Uuid) -> StoreResult<i32> {
        let version: i32 = sqlx::query_scalar(
            "UPDATE users SET auth_version = GREATEST(auth_version, 1)
             WHERE id = $1
             RETURNING auth_version",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(version)
    }

    async fn bump_auth_version(&self, id: Uuid) -> StoreResult<i32> {
        let version: i32 = sqlx::query_scalar(
            "UPDATE users SET auth_version = auth_version + 1, updated_at = NOW()
             WHERE id = $1
             RETURNING auth_version",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(version)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<i32> {
        let version: i32 = sqlx::query_scalar(
            "UPDATE users
             SET password_hash = $1, auth_version = auth_version + 1, updated_at = NOW()
             WHERE id = $2
             RETURNING auth_version",
        )
        .bind(password_hash)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(version)
    }

    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE users SET is_email_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
