use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{TtlCache, WindowHits};
use crate::config::RateLimitConfig;
use crate::error::{AuthError, AuthResult};
use crate::services::metrics::RATE_LIMITED_COUNTER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPurpose {
    /// Keyed by email and client IP.
    Login,
    /// Keyed by email alone, so rotating forwarding headers buys nothing.
    LoginAccount,
    PasswordReset,
    VerifyEmail,
}

impl RateLimitPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            RateLimitPurpose::Login => "login",
            RateLimitPurpose::LoginAccount => "login_account",
            RateLimitPurpose::PasswordReset => "password_reset",
            RateLimitPurpose::VerifyEmail => "verify_email",
        }
    }

    /// `rl:auth:<purpose>:<subject>`
    pub fn key(self, subject: &str) -> String {
        format!("rl:auth:{}:{}", self.as_str(), subject)
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    max: u64,
    window: Duration,
    min_interval: Option<Duration>,
}

/// Sliding-window limiter for the abuse-sensitive auth endpoints.
///
/// Only accepted requests stay in a window: a rejected call takes its hit back,
/// so a flood of refused attempts cannot lock out the next legitimate one.
/// If the cache is unreachable the request is let through.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn TtlCache>,
    limits: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn TtlCache>, limits: RateLimitConfig) -> Self {
        Self { cache, limits }
    }

    fn rule(&self, purpose: RateLimitPurpose) -> Rule {
        let l = &self.limits;
        match purpose {
            RateLimitPurpose::Login => Rule {
                max: l.login_max,
                window: Duration::from_secs(l.login_window_seconds),
                min_interval: None,
            },
            RateLimitPurpose::LoginAccount => Rule {
                max: l.login_account_max,
                window: Duration::from_secs(l.login_window_seconds),
                min_interval: None,
            },
            RateLimitPurpose::PasswordReset => Rule {
                max: l.password_reset_max,
                window: Duration::from_secs(l.password_reset_window_seconds),
                min_interval: non_zero(l.password_reset_min_interval_seconds),
            },
            RateLimitPurpose::VerifyEmail => Rule {
                max: l.verify_email_max,
                window: Duration::from_secs(l.verify_email_window_seconds),
                min_interval: non_zero(l.verify_email_min_interval_seconds),
            },
        }
    }

    pub async fn check(&self, purpose: RateLimitPurpose, subject: &str) -> AuthResult<()> {
        self.check_at(purpose, subject, Utc::now()).await
    }

    /// Passes only if every window admits the request. On rejection none of
    /// the windows keeps the hit.
    pub async fn check_all(&self, checks: &[(RateLimitPurpose, &str)]) -> AuthResult<()> {
        self.check_all_at(checks, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        purpose: RateLimitPurpose,
        subject: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        self.check_all_at(&[(purpose, subject)], now).await
    }

    pub async fn check_all_at(
        &self,
        checks: &[(RateLimitPurpose, &str)],
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let mut recorded = Vec::with_capacity(checks.len());
        let mut rejected = None;

        for &(purpose, subject) in checks {
            let rule = self.rule(purpose);
            let key = purpose.key(subject);

            let hits = match self.cache.record_hit(&key, now, rule.window).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(purpose = purpose.as_str(), "rate limiter unavailable: {}", e);
                    continue;
                }
            };

            let limited = rule.rejects(&hits, now);
            let count = hits.count;
            recorded.push((key, hits.hit));
            if limited {
                rejected = Some((purpose, count));
                break;
            }
        }

        let Some((purpose, count)) = rejected else {
            return Ok(());
        };

        for (key, hit) in &recorded {
            if let Err(e) = self.cache.forget_hit(key, hit).await {
                tracing::warn!(purpose = purpose.as_str(), "failed to roll back rate limit hit: {}", e);
            }
        }

        RATE_LIMITED_COUNTER
            .with_label_values(&[purpose.as_str()])
            .inc();
        tracing::info!(purpose = purpose.as_str(), count, "rate limited");
        Err(AuthError::RateLimited)
    }
}

impl Rule {
    fn rejects(&self, hits: &WindowHits, now: DateTime<Utc>) -> bool {
        let too_many = hits.count > self.max;
        let too_soon = match (self.min_interval, hits.previous) {
            (Some(min), Some(previous)) => (now - previous).to_std().unwrap_or_default() < min,
            _ => false,
        };
        too_many || too_soon
    }
}

fn non_zero(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    fn limiter(limits: RateLimitConfig) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCache::new()), limits)
    }

    #[tokio::test]
    async fn allows_max_then_rejects() {
        let limiter = limiter(RateLimitConfig {
            login_max: 3,
            ..RateLimitConfig::default()
        });
        let now = Utc::now();

        for i in 0..3 {
            let at = now + ChronoDuration::seconds(i);
            limiter.check_at(RateLimitPurpose::Login, "a@x.io:1.2.3.4", at).await.unwrap();
        }
        let err = limiter
            .check_at(RateLimitPurpose::Login, "a@x.io:1.2.3.4", now + ChronoDuration::seconds(3))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RateLimited));

        // A different subject has its own window.
        limiter.check_at(RateLimitPurpose::Login, "a@x.io:5.6.7.8", now).await.unwrap();
    }

    #[tokio::test]
    async fn window_slides() {
        let limiter = limiter(RateLimitConfig {
            login_max: 1,
            login_window_seconds: 60,
            ..RateLimitConfig::default()
        });
        let now = Utc::now();

        limiter.check_at(RateLimitPurpose::Login, "k", now).await.unwrap();
        assert!(limiter
            .check_at(RateLimitPurpose::Login, "k", now + ChronoDuration::seconds(10))
            .await
            .is_err());
        limiter
            .check_at(RateLimitPurpose::Login, "k", now + ChronoDuration::seconds(200))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn enforces_minimum_interval() {
        let limiter = limiter(RateLimitConfig::default());
        let now = Utc::now();

        limiter.check_at(RateLimitPurpose::PasswordReset, "a@x.io", now).await.unwrap();
        assert!(limiter
            .check_at(RateLimitPurpose::PasswordReset, "a@x.io", now + ChronoDuration::seconds(5))
            .await
            .is_err());
        limiter
            .check_at(RateLimitPurpose::PasswordReset, "a@x.io", now + ChronoDuration::seconds(40))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refused_attempts_do_not_extend_the_minimum_interval() {
        let limiter = limiter(RateLimitConfig::default());
        let now = Utc::now();
        let at = |secs| now + ChronoDuration::seconds(secs);

        limiter.check_at(RateLimitPurpose::PasswordReset, "a@x.io", now).await.unwrap();
        for secs in [5, 10, 20, 29] {
            assert!(limiter
                .check_at(RateLimitPurpose::PasswordReset, "a@x.io", at(secs))
                .await
                .is_err());
        }
        limiter
            .check_at(RateLimitPurpose::PasswordReset, "a@x.io", at(31))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refused_attempts_do_not_fill_the_window() {
        let limiter = limiter(RateLimitConfig {
            login_max: 2,
            login_window_seconds: 60,
            ..RateLimitConfig::default()
        });
        let now = Utc::now();
        let at = |secs| now + ChronoDuration::seconds(secs);

        limiter.check_at(RateLimitPurpose::Login, "k", now).await.unwrap();
        limiter.check_at(RateLimitPurpose::Login, "k", at(1)).await.unwrap();
        for secs in 2..20 {
            assert!(limiter.check_at(RateLimitPurpose::Login, "k", at(secs)).await.is_err());
        }

        // Only the first accepted hit has aged out.
        limiter.check_at(RateLimitPurpose::Login, "k", at(60)).await.unwrap();
    }

    #[tokio::test]
    async fn account_window_caps_logins_across_addresses() {
        let limiter = limiter(RateLimitConfig {
            login_max: 3,
            login_account_max: 5,
            ..RateLimitConfig::default()
        });
        let now = Utc::now();

        let mut refused = 0;
        for i in 0..20 {
            let per_client = format!("a@x.io:10.0.0.{i}");
            let result = limiter
                .check_all_at(
                    &[
                        (RateLimitPurpose::Login, per_client.as_str()),
                        (RateLimitPurpose::LoginAccount, "a@x.io"),
                    ],
                    now + ChronoDuration::seconds(i),
                )
                .await;
            if result.is_err() {
                refused += 1;
            }
        }
        assert_eq!(refused, 15);
    }

    #[tokio::test]
    async fn rejection_rolls_back_every_window() {
        let limiter = limiter(RateLimitConfig {
            login_max: 2,
            login_account_max: 1,
            ..RateLimitConfig::default()
        });
        let now = Utc::now();
        let both = |client: &'static str| {
            [
                (RateLimitPurpose::Login, client),
                (RateLimitPurpose::LoginAccount, "a@x.io"),
            ]
        };

        limiter.check_all_at(&both("a@x.io:1.1.1.1"), now).await.unwrap();
        assert!(limiter.check_all_at(&both("a@x.io:2.2.2.2"), now).await.is_err());

        // The refused call left nothing behind in the per-client window.
        for _ in 0..2 {
            limiter
                .check_at(RateLimitPurpose::Login, "a@x.io:2.2.2.2", now)
                .await
                .unwrap();
        }
    }

    struct Broken;

    #[async_trait]
    impl TtlCache for Broken {
        async fn get(&self, _: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("down")
        }
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> anyhow::Result<()> {
            anyhow::bail!("down")
        }
        async fn delete(&self, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("down")
        }
        async fn record_hit(&self, _: &str, _: DateTime<Utc>, _: Duration) -> anyhow::Result<WindowHits> {
            anyhow::bail!("down")
        }
        async fn forget_hit(&self, _: &str, _: &str) -> anyhow::Result<()> {
            anyhow::bail!("down")
        }
    }

    #[tokio::test]
    async fn cache_outage_fails_open() {
        let limiter = RateLimiter::new(Arc::new(Broken), RateLimitConfig::default());
        limiter.check(RateLimitPurpose::Login, "anyone").await.unwrap();
    }

    #[test]
    fn keys_are_namespaced_by_purpose() {
        assert_eq!(RateLimitPurpose::Login.key("a@x.io:1.2.3.4"), "rl:auth:login:a@x.io:1.2.3.4");
        assert_eq!(RateLimitPurpose::LoginAccount.key("a@x.io"), "rl:auth:login_account:a@x.io");
        assert_eq!(RateLimitPurpose::VerifyEmail.key("a@x.io"), "rl:auth:verify_email:a@x.io");
    }
}
