use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::models::tokens::EphemeralPayload;
use crate::services::token_issuer::generate_token;

/// What actually lands in the cache. `exp_at` is checked on read, so an entry
/// that outlives its TTL (clock drift, PERSIST by an operator) still dies.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<P> {
    exp_at: DateTime<Utc>,
    payload: P,
}

/// Single-use tokens (password reset, email verification, invitations).
#[derive(Clone)]
pub struct EphemeralTokens {
    cache: Arc<dyn TtlCache>,
}

impl EphemeralTokens {
    pub fn new(cache: Arc<dyn TtlCache>) -> Self {
        Self { cache }
    }

    pub async fn put<P: EphemeralPayload>(
        &self,
        payload: &P,
        ttl: Duration,
    ) -> anyhow::Result<(String, DateTime<Utc>)> {
        let token = generate_token()?;
        let exp_at = Utc::now() + chrono::Duration::from_std(ttl)?;
        let body = serde_json::to_string(&Envelope { exp_at, payload })?;
        self.cache
            .set_ex(&P::PURPOSE.key(&token), &body, ttl)
            .await?;
        Ok((token, exp_at))
    }

    /// Missing, malformed and expired tokens all read as `None`.
    pub async fn get<P: EphemeralPayload>(&self, token: &str) -> anyhow::Result<Option<P>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        let Some(raw) = self.cache.get(&P::PURPOSE.key(token)).await? else {
            return Ok(None);
        };
        let envelope: Envelope<P> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(purpose = ?P::PURPOSE, "discarding unreadable token payload: {}", e);
                return Ok(None);
            }
        };
        if envelope.exp_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(envelope.payload))
    }

    /// Call only once the token's effect has been persisted.
    pub async fn consume<P: EphemeralPayload>(&self, token: &str) -> anyhow::Result<()> {
        self.cache.delete(&P::PURPOSE.key(token.trim())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::tokens::{PasswordResetPayload, VerifyEmailPayload};
    use uuid::Uuid;

    fn payload() -> PasswordResetPayload {
        PasswordResetPayload {
            user_id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            email: "ana@example.com".into(),
        }
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let cache = Arc::new(MemoryCache::new());
        let tokens = EphemeralTokens::new(cache.clone());
        let original = payload();

        let (token, _) = tokens.put(&original, Duration::from_secs(60)).await.unwrap();
        assert_eq!(token.len(), 64);
        assert_eq!(cache.keys_with_prefix("pwreset:"), vec![format!("pwreset:{token}")]);

        let read: Option<PasswordResetPayload> = tokens.get(&token).await.unwrap();
        assert_eq!(read, Some(original));

        tokens.consume::<PasswordResetPayload>(&token).await.unwrap();
        let again: Option<PasswordResetPayload> = tokens.get(&token).await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn purposes_do_not_cross() {
        let tokens = EphemeralTokens::new(Arc::new(MemoryCache::new()));
        let (token, _) = tokens.put(&payload(), Duration::from_secs(60)).await.unwrap();

        let as_verify: Option<VerifyEmailPayload> = tokens.get(&token).await.unwrap();
        assert!(as_verify.is_none());
    }

    #[tokio::test]
    async fn envelope_expiry_wins_over_cache_ttl() {
        let cache = Arc::new(MemoryCache::new());
        let tokens = EphemeralTokens::new(cache.clone());
        let stale = serde_json::to_string(&Envelope {
            exp_at: Utc::now() - chrono::Duration::seconds(1),
            payload: payload(),
        })
        .unwrap();
        cache
            .set_ex("pwreset:stale", &stale, Duration::from_secs(600))
            .await
            .unwrap();

        let read: Option<PasswordResetPayload> = tokens.get("stale").await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn garbage_payload_reads_as_absent() {
        let cache = Arc::new(MemoryCache::new());
        let tokens = EphemeralTokens::new(cache.clone());
        cache
            .set_ex("pwreset:junk", "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        let read: Option<PasswordResetPayload> = tokens.get("junk").await.unwrap();
        assert!(read.is_none());
        let empty: Option<PasswordResetPayload> = tokens.get("").await.unwrap();
        assert!(empty.is_none());
    }
}
