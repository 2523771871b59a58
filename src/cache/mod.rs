//! Key-value store with per-key TTL, plus the sliding-window counter used for
//! rate limiting. Redis backs it in production; [`MemoryCache`] backs tests.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Outcome of recording one hit in a sliding window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHits {
    /// Hits inside the window, including the one just recorded.
    pub count: u64,
    /// Most recent earlier hit still inside the window.
    pub previous: Option<DateTime<Utc>>,
    /// Identifies the hit just recorded, for [`TtlCache::forget_hit`].
    pub hit: String,
}

#[async_trait]
pub trait TtlCache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// A zero `ttl` is rejected: every entry must eventually expire.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Drops hits older than `window`, records a hit at `now` and reports the
    /// resulting count. Runs as one atomic step per key.
    async fn record_hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> anyhow::Result<WindowHits>;

    /// Removes one previously recorded hit. Unknown hits are ignored.
    async fn forget_hit(&self, key: &str, hit: &str) -> anyhow::Result<()>;
}

fn ensure_ttl(ttl: Duration) -> anyhow::Result<()> {
    if ttl.is_zero() {
        anyhow::bail!("cache ttl must be positive");
    }
    Ok(())
}

fn hit_id(now: DateTime<Utc>) -> String {
    format!("{}:{}", now.timestamp_millis(), uuid::Uuid::new_v4())
}
