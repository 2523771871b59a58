//! In-process stores used by the test suites and local experiments. They
//! honour the same contracts as the Postgres stores (unique email, unique
//! token hash, atomic counters) behind a mutex.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{SessionStore, StoreError, StoreResult, UserStore};
use crate::models::session::{NewSession, Session};
use crate::models::user::{NewUser, User};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row as-is, e.g. a legacy user with `auth_version = 0`.
    pub fn insert(&self, user: User) {
        self.lock().insert(user.id, user);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, User>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut User) -> T) -> StoreResult<T> {
        let mut users = self.lock();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))?;
        user.updated_at = Utc::now();
        Ok(f(user))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut users = self.lock();
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(
                "user with this email already exists".into(),
            ));
        }
        let now = Utc::now();
        let row = User {
            id: Uuid::new_v4(),
            workspace_id: user.workspace_id,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role.to_string(),
            is_email_verified: user.is_email_verified,
            auth_version: 1,
            created_at: now,
            updated_at: now,
        };
        users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn ensure_auth_version(&self, id: Uuid) -> StoreResult<i32> {
        self.update(id, |u| {
            u.auth_version = u.auth_version.max(1);
            u.auth_version
        })
    }

    async fn bump_auth_version(&self, id: Uuid) -> StoreResult<i32> {
        self.update(id, |u| {
            u.auth_version += 1;
            u.auth_version
        })
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> StoreResult<i32> {
        self.update(id, |u| {
            u.password_hash = password_hash.to_string();
            u.auth_version += 1;
            u.auth_version
        })
    }

    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<()> {
        self.update(id, |u| u.is_email_verified = true)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions_for_user(&self, user_id: Uuid) -> Vec<Session> {
        self.lock()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: NewSession) -> StoreResult<Session> {
        let mut sessions = self.lock();
        if sessions.contains_key(&session.token_hash) {
            return Err(StoreError::Conflict("duplicate session token".into()));
        }
        let row = Session {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            workspace_id: session.workspace_id,
            token_hash: session.token_hash,
            expires_at: session.expires_at,
            created_ip: session.created_ip,
            user_agent: session.user_agent,
            created_at: Utc::now(),
        };
        sessions.insert(row.token_hash.clone(), row.clone());
        Ok(row)
    }

    async fn find_active_by_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        Ok(self
            .lock()
            .get(token_hash)
            .filter(|s| s.expires_at > now)
            .cloned())
    }

    async fn revoke_by_token_hash(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(self.lock().remove(token_hash).is_some())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn revoke_others_for_user(&self, user_id: Uuid, except_hash: &str) -> StoreResult<u64> {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|hash, s| s.user_id != user_id || hash == except_hash);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}
